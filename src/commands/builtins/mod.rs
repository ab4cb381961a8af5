//! Commands every jobbox instance ships with: job queries, log access,
//! cancellation and API token management.

mod info;
mod jobs;
mod tokens;

pub use info::HelpCommand;

use super::{Command, CommandContext, CommandDescriptor, CommandOutput, CommandRegistry};
use crate::auth::{ADMIN_GROUP, Groups};
use crate::error::{Error, Result};
use crate::jobs::{Job, JobLedger, LogStore};
use crate::render::{Renderer, default_templates, plain_templates};
use crate::tokens::TokenStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const VERSION: &str = "version";
pub const HELP: &str = "help";
pub const GROUPS: &str = "groups";
pub const JOBS: &str = "jobs";
pub const JOB: &str = "job";
pub const AUDIT: &str = "audit";
pub const AUDIT_JOB: &str = "auditjob";
pub const AUDIT_LOGS: &str = "auditlogs";
pub const LAST: &str = "last";
pub const TAIL: &str = "tail";
pub const LOGS: &str = "logs";
pub const CANCEL: &str = "cancel";
pub const KILL: &str = "kill";
pub const TOKEN_NEW: &str = "token-new";
pub const TOKENS: &str = "tokens";
pub const TOKEN_REVOKE: &str = "token-revoke";

/// Every builtin name, reserved against configured commands.
pub const NAMES: &[&str] = &[
    VERSION, HELP, GROUPS, JOBS, JOB, AUDIT, AUDIT_JOB, AUDIT_LOGS, LAST, TAIL, LOGS, CANCEL,
    KILL, TOKEN_NEW, TOKENS, TOKEN_REVOKE,
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Cancellation signal keyed by job id. Fire-and-forget and idempotent.
pub type CancelFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Collaborators the builtins read from.
#[derive(Clone)]
pub struct BuiltinContext {
    pub ledger: JobLedger,
    pub logs: LogStore,
    pub tokens: TokenStore,
    pub groups: Groups,
    pub renderer: Renderer,
    pub cancel: CancelFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Version,
    Groups,
    Jobs,
    Job,
    Audit,
    AuditJob,
    AuditLogs,
    Last,
    Tail,
    Logs,
    Cancel,
    Kill,
    TokenNew,
    Tokens,
    TokenRevoke,
}

struct Builtin {
    descriptor: CommandDescriptor,
    kind: Kind,
    ctx: Arc<BuiltinContext>,
}

impl Command for Builtin {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn execute<'a>(
        &'a self,
        _ctx: CommandContext,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + 'a>> {
        Box::pin(async move {
            let ctx = self.ctx.as_ref();
            match self.kind {
                Kind::Version => Ok(info::version()),
                Kind::Groups => info::groups(ctx),
                Kind::Jobs => jobs::list(ctx, job).await,
                Kind::Job => jobs::show(ctx, job).await,
                Kind::Audit => jobs::audit(ctx, job).await,
                Kind::AuditJob => jobs::audit_job(ctx, job).await,
                Kind::AuditLogs => jobs::audit_logs(ctx, job).await,
                Kind::Last => jobs::last(ctx, job).await,
                Kind::Tail => jobs::tail(ctx, job).await,
                Kind::Logs => jobs::logs(ctx, job).await,
                Kind::Cancel => jobs::cancel(ctx, job).await,
                Kind::Kill => jobs::kill(ctx, job).await,
                Kind::TokenNew => tokens::create(ctx, job).await,
                Kind::Tokens => tokens::list(ctx, job).await,
                Kind::TokenRevoke => tokens::revoke(ctx, job).await,
            }
        })
    }
}

/// Register every builtin except `help`, which has to be added last with
/// [`add_help_command`] so it can list everything else.
pub fn register(registry: &mut CommandRegistry, ctx: BuiltinContext) {
    let ctx = Arc::new(ctx);
    let admins = [ADMIN_GROUP];
    let entries: [(Kind, CommandDescriptor); 15] = [
        (
            Kind::Version,
            CommandDescriptor::new(VERSION, "prints the running jobbox version")
                .with_templates(plain_templates()),
        ),
        (
            Kind::Groups,
            CommandDescriptor::new(GROUPS, "prints the configured groups")
                .allow_groups(&admins)
                .with_templates(plain_templates()),
        ),
        (
            Kind::Jobs,
            CommandDescriptor::new(
                JOBS,
                "shows the last executed jobs for the calling user, accepts -limit",
            )
            .with_templates(plain_templates()),
        ),
        (
            Kind::Job,
            CommandDescriptor::new(JOB, "find one job by id").with_templates(plain_templates()),
        ),
        (
            Kind::Audit,
            CommandDescriptor::new(
                AUDIT,
                "lists jobs from all users or a specific one (admin only), accepts -user and -limit to filter.",
            )
            .allow_groups(&admins)
            .with_templates(plain_templates()),
        ),
        (
            Kind::AuditJob,
            CommandDescriptor::new(
                AUDIT_JOB,
                "shows a command metadata by job ID from any user (admin only)",
            )
            .allow_groups(&admins)
            .with_templates(plain_templates()),
        ),
        (
            Kind::AuditLogs,
            CommandDescriptor::new(
                AUDIT_LOGS,
                "shows the logs of any command by job ID (admin only)",
            )
            .allow_groups(&admins)
            .with_templates(default_templates()),
        ),
        (
            Kind::Last,
            CommandDescriptor::new(LAST, "shows the last executed command by the calling user")
                .with_templates(plain_templates()),
        ),
        (
            Kind::Tail,
            CommandDescriptor::new(TAIL, "returns the last command output or error"),
        ),
        (
            Kind::Logs,
            CommandDescriptor::new(LOGS, "returns the logs of the command id passed as argument"),
        ),
        (
            Kind::Cancel,
            CommandDescriptor::new(
                CANCEL,
                "cancels a jobs owned by the calling user that is currently running",
            ),
        ),
        (
            Kind::Kill,
            CommandDescriptor::new(KILL, "cancels a jobs that is currently running, from any user")
                .allow_groups(&admins),
        ),
        (
            Kind::TokenNew,
            CommandDescriptor::new(
                TOKEN_NEW,
                "creates a new API token for the calling user, channel and command with args, requires at least #channel and command",
            )
            .allow_groups(&admins)
            .with_templates(plain_templates()),
        ),
        (
            Kind::Tokens,
            CommandDescriptor::new(TOKENS, "lists the API tokens")
                .allow_groups(&admins)
                .with_templates(plain_templates()),
        ),
        (
            Kind::TokenRevoke,
            CommandDescriptor::new(TOKEN_REVOKE, "revokes an API token")
                .allow_groups(&admins)
                .with_templates(plain_templates()),
        ),
    ];

    for (kind, descriptor) in entries {
        registry.register(Box::new(Builtin {
            descriptor,
            kind,
            ctx: Arc::clone(&ctx),
        }));
    }
}

/// Add `help` listing every command currently in `registry`, itself
/// included.
pub fn add_help_command(registry: &mut CommandRegistry, renderer: Renderer) {
    let help = HelpCommand::new(registry, renderer);
    registry.register(Box::new(help));
}

/// First argument of the invocation as a job id.
fn parse_job_id(job: &Job) -> Result<u64> {
    let raw = job
        .request
        .args
        .first()
        .ok_or_else(|| Error::invalid("no job id passed"))?;
    raw.parse::<u64>()
        .map_err(|e| Error::invalid(format!("invalid job ID {raw}: {e}")))
}
