pub mod builtins;
pub mod flags;
pub mod registry;
pub mod shell;

pub use registry::CommandRegistry;
pub use shell::ShellCommand;

use crate::auth::AuthStrategy;
use crate::jobs::Job;
use crate::render::{Templates, default_templates};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Static metadata of a command: how it is authorized, how long it may run,
/// whether its invocations are recorded, and how its outcome is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: String,
    pub help: String,
    pub auth_strategy: AuthStrategy,
    pub allowed_groups: Vec<String>,
    pub timeout: Duration,
    pub record: bool,
    pub requires_handshake: bool,
    pub default_args: Vec<String>,
    pub templates: Templates,
}

impl CommandDescriptor {
    /// Unrecorded, open to anyone, no handshake, default timeout and
    /// templates.
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            auth_strategy: AuthStrategy::Any,
            allowed_groups: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            record: false,
            requires_handshake: false,
            default_args: Vec::new(),
            templates: default_templates(),
        }
    }

    pub fn allow_groups(mut self, groups: &[&str]) -> Self {
        self.auth_strategy = AuthStrategy::AllowedGroup;
        self.allowed_groups = groups.iter().map(ToString::to_string).collect();
        self
    }

    pub fn recorded(mut self) -> Self {
        self.record = true;
        self
    }

    pub fn with_handshake(mut self) -> Self {
        self.requires_handshake = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_templates(mut self, templates: Templates) -> Self {
        self.templates = templates;
        self
    }
}

/// What a command body produced. A body can fail and still have output
/// worth showing, so the error travels next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub error: Option<String>,
}

impl CommandOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

/// Per-invocation context handed to a command body.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Cancelled when the invocation times out or is cancelled by a user.
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

/// A command implementation: a descriptor plus the body run on dispatch.
pub trait Command: Send + Sync {
    fn descriptor(&self) -> &CommandDescriptor;

    fn execute<'a>(
        &'a self,
        ctx: CommandContext,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + 'a>>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}
