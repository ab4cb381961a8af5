use super::{BuiltinContext, HELP};
use crate::commands::{Command, CommandContext, CommandDescriptor, CommandOutput, CommandRegistry};
use crate::jobs::Job;
use crate::render::{Payload, Renderer, plain_templates};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

const GROUPS_TEMPLATE: &str = concat!(
    "{% for group, users in groups %}",
    "\n- {{ group }}:",
    "{% for user in users %}{% if not loop.first %},{% endif %} {{ user }}{% endfor %}",
    "{% endfor %}\n",
);

const HELP_TEMPLATE: &str = concat!(
    "\n",
    "{% for command in commands %}- {{ command.name }}: {{ command.help }}\n{% endfor %}",
);

pub(super) fn version() -> CommandOutput {
    CommandOutput::text(format!("jobbox version {}", env!("CARGO_PKG_VERSION")))
}

pub(super) fn groups(ctx: &BuiltinContext) -> anyhow::Result<CommandOutput> {
    let mut payload = Payload::new();
    payload.insert("groups", ctx.groups.get_groups());
    Ok(CommandOutput::text(
        ctx.renderer.render("groups", GROUPS_TEMPLATE, &payload)?,
    ))
}

#[derive(Debug, Clone, Serialize)]
struct HelpEntry {
    name: String,
    help: String,
}

/// Lists the commands known when it was built, sorted by name.
pub struct HelpCommand {
    descriptor: CommandDescriptor,
    entries: Vec<HelpEntry>,
    renderer: Renderer,
}

impl HelpCommand {
    pub fn new(registry: &CommandRegistry, renderer: Renderer) -> Self {
        let descriptor = CommandDescriptor::new(
            HELP,
            "prints all the known commands and its associated help",
        )
        .with_templates(plain_templates());

        let mut entries: Vec<HelpEntry> = registry
            .descriptors()
            .into_iter()
            .filter(|d| d.name != HELP)
            .map(|d| HelpEntry {
                name: d.name.clone(),
                help: d.help.clone(),
            })
            .collect();
        entries.push(HelpEntry {
            name: descriptor.name.clone(),
            help: descriptor.help.clone(),
        });
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            descriptor,
            entries,
            renderer,
        }
    }
}

impl Command for HelpCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn execute<'a>(
        &'a self,
        _ctx: CommandContext,
        _job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + 'a>> {
        Box::pin(async move {
            let mut payload = Payload::new();
            payload.insert("commands", &self.entries);
            Ok(CommandOutput::text(
                self.renderer.render("help", HELP_TEMPLATE, &payload)?,
            ))
        })
    }
}
