//! Turns a parsed [`Request`] into a job: resolve the command, authorize the
//! caller, record the job, run the body under its deadline, store the
//! outcome and render the reply.

pub mod runner;

pub use runner::{JobRunner, RunOutcome};

use crate::auth::Groups;
use crate::commands::builtins::{self, BuiltinContext};
use crate::commands::{Command, CommandContext, CommandDescriptor, CommandRegistry};
use crate::error::{Error, Result};
use crate::jobs::{Job, JobLedger, JobStatus, LogStore, Request};
use crate::render::{
    FAILURE, HANDSHAKE, Payload, Renderer, SUCCESS, UNAUTHORIZED, UNKNOWN_COMMAND,
    default_templates,
};
use crate::request::request_from_line;
use crate::store::Store;
use crate::tokens::TokenStore;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of one dispatched invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Ledger id, `None` for commands that are not recorded.
    pub job_id: Option<u64>,
    pub status: JobStatus,
    /// Rendered message for the chat channel.
    pub text: String,
    pub error: Option<String>,
}

pub struct Dispatcher {
    registry: CommandRegistry,
    groups: Groups,
    ledger: JobLedger,
    logs: LogStore,
    tokens: TokenStore,
    renderer: Renderer,
    runner: Arc<JobRunner>,
    handshake: Option<mpsc::UnboundedSender<String>>,
}

impl Dispatcher {
    /// Build a dispatcher over `store` with the builtins, the given
    /// `commands` and finally `help`.
    pub fn new(store: Store, groups: Groups, commands: Vec<Box<dyn Command>>) -> Self {
        let ledger = JobLedger::new(store.clone());
        let logs = LogStore::new(store.clone());
        let tokens = TokenStore::new(store);
        let renderer = Renderer::new();
        let runner = Arc::new(JobRunner::new());

        let mut registry = CommandRegistry::new();
        builtins::register(
            &mut registry,
            BuiltinContext {
                ledger: ledger.clone(),
                logs: logs.clone(),
                tokens: tokens.clone(),
                groups: groups.clone(),
                renderer: renderer.clone(),
                cancel: runner.cancel_fn(),
            },
        );
        for command in commands {
            if builtins::is_builtin(command.name()) || registry.contains(command.name()) {
                tracing::warn!(command = command.name(), "ignoring command with a taken name");
                continue;
            }
            registry.register(command);
        }
        builtins::add_help_command(&mut registry, renderer.clone());

        Self {
            registry,
            groups,
            ledger,
            logs,
            tokens,
            renderer,
            runner,
            handshake: None,
        }
    }

    /// Send rendered handshakes of commands that request one on `sender`.
    pub fn with_handshake(mut self, sender: mpsc::UnboundedSender<String>) -> Self {
        self.handshake = Some(sender);
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub async fn dispatch(&self, request: Request) -> Result<Reply> {
        let command = self.registry.get(&request.command)?;
        let descriptor = command.descriptor();

        if !self.groups.is_allowed(&request.username, descriptor) {
            tracing::warn!(user = %request.username, command = %descriptor.name, "unauthorized invocation");
            return Err(Error::Unauthorized {
                user: request.username,
                command: request.command,
            });
        }

        let job = if descriptor.record {
            self.ledger.create(request).await?
        } else {
            Job::transient(request)
        };
        let job_id = descriptor.record.then_some(job.id);
        tracing::info!(job_id = job.id, command = %descriptor.name, user = %job.request.username, "dispatching");

        if descriptor.requires_handshake {
            self.send_handshake(descriptor, &job);
        }

        let outcome = self
            .runner
            .run(job_id, descriptor.timeout, |token| {
                command.execute(CommandContext::new(token), &job)
            })
            .await;

        let (mut status, output, error) = match outcome {
            RunOutcome::Completed(Ok(out)) => match out.error {
                None => (JobStatus::Successful, out.output, None),
                Some(error) => (JobStatus::Failed, out.output, Some(error)),
            },
            RunOutcome::Completed(Err(e)) => (JobStatus::Failed, String::new(), Some(e.to_string())),
            RunOutcome::TimedOut => {
                let timeout = Error::Timeout {
                    command: descriptor.name.clone(),
                    timeout: descriptor.timeout,
                };
                (JobStatus::Failed, String::new(), Some(timeout.to_string()))
            }
            RunOutcome::Cancelled => (
                JobStatus::Cancelled,
                String::new(),
                Some(format!("job {} was cancelled", job.id)),
            ),
        };

        if let Some(id) = job_id {
            // The job is finished even when its log could not be written.
            let logged = self.write_log(id, &output, error.as_deref()).await;
            if let Err(e) = &logged {
                tracing::warn!(job_id = id, error = %e, "could not write job log");
                status = JobStatus::Failed;
            }
            self.ledger.finish(id, status).await?;
            logged?;
        }
        tracing::info!(job_id = job.id, command = %descriptor.name, status = %status, "finished");

        let mut payload = base_payload(&job.request);
        payload.insert("job_id", &job.id);
        payload.insert("status", status.as_str());
        payload.insert("output", &output);
        payload.insert("error", error.as_deref().unwrap_or_default());
        let key = if status == JobStatus::Successful {
            SUCCESS
        } else {
            FAILURE
        };
        let text = self
            .renderer
            .render_outcome(&descriptor.templates, key, &payload)?;

        Ok(Reply {
            job_id,
            status,
            text,
            error,
        })
    }

    /// Replay a stored token as an invocation by its user in its channel.
    pub async fn dispatch_token(&self, token_id: &str) -> Result<Reply> {
        let token = self.tokens.get(token_id).await?;
        let user = if token.user_id.is_empty() {
            token.user_link.clone()
        } else {
            token.user_id.clone()
        };
        let origin = Request {
            username: user.clone(),
            user_id: user,
            user_link: token.user_link.clone(),
            channel: token.channel_link.clone(),
            channel_link: token.channel_link.clone(),
            ..Request::default()
        };
        let request = request_from_line(&token.text, &origin)?;
        tracing::info!(token_id, command = %request.command, "replaying token");
        self.dispatch(request).await
    }

    /// Message for an invocation that failed before its body ran.
    pub fn reply_for_error(&self, request: &Request, error: &Error) -> String {
        let mut payload = base_payload(request);
        payload.insert("error", &error.to_string());
        let key = match error {
            Error::CommandNotFound(_) => UNKNOWN_COMMAND,
            Error::Unauthorized { .. } => UNAUTHORIZED,
            _ => FAILURE,
        };
        self.renderer
            .render_outcome(&default_templates(), key, &payload)
            .unwrap_or_else(|render_error| {
                tracing::warn!(%render_error, "could not render error reply");
                error.to_string()
            })
    }

    async fn write_log(&self, job_id: u64, output: &str, error: Option<&str>) -> Result<()> {
        self.logs.append(job_id, output).await?;
        self.logs.set_error(job_id, error).await
    }

    fn send_handshake(&self, descriptor: &CommandDescriptor, job: &Job) {
        let Some(sender) = &self.handshake else {
            return;
        };
        let mut payload = base_payload(&job.request);
        payload.insert("job_id", &job.id);
        match self
            .renderer
            .render_outcome(&descriptor.templates, HANDSHAKE, &payload)
        {
            Ok(text) => {
                if sender.send(text).is_err() {
                    tracing::debug!(job_id = job.id, "handshake receiver dropped");
                }
            }
            Err(e) => tracing::warn!(job_id = job.id, error = %e, "could not render handshake"),
        }
    }
}

fn base_payload(request: &Request) -> Payload {
    let user = if request.user_link.is_empty() {
        &request.username
    } else {
        &request.user_link
    };
    let mut payload = Payload::new();
    payload.insert("user", user);
    payload.insert("username", &request.username);
    payload.insert("command", &request.command);
    payload.insert("args", &request.args);
    payload.insert("channel", &request.channel_link);
    payload
}
