use super::{Command, CommandContext, CommandDescriptor, CommandOutput};
use crate::jobs::Job;
use anyhow::Context;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

/// Maximum captured size per stream in bytes (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;
/// Environment variables passed through to configured commands.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL",
];

/// A configured external program. The descriptor's default args come first,
/// then the invocation args. stdout is the output; a non-zero exit is an
/// error carrying stderr.
pub struct ShellCommand {
    descriptor: CommandDescriptor,
    program: String,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>, descriptor: CommandDescriptor) -> Self {
        Self {
            descriptor,
            program: program.into(),
        }
    }
}

impl Command for ShellCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn execute<'a>(
        &'a self,
        ctx: CommandContext,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&self.program);
            cmd.args(&self.descriptor.default_args)
                .args(&job.request.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .env_clear()
                .kill_on_drop(true);

            for var in SAFE_ENV_VARS {
                if let Ok(val) = std::env::var(var) {
                    cmd.env(var, val);
                }
            }
            cmd.env("JOBBOX_JOB_ID", job.id.to_string())
                .env("JOBBOX_USER", &job.request.username)
                .env("JOBBOX_CHANNEL", &job.request.channel);

            tracing::debug!(program = %self.program, job_id = job.id, "spawning command");

            // Dropping the output future drops the child, which kills it.
            let output = tokio::select! {
                output = cmd.output() => output
                    .with_context(|| format!("failed to execute {}", self.program))?,
                () = ctx.cancel.cancelled() => anyhow::bail!("command {} was cancelled", self.descriptor.name),
            };

            let stdout = truncated(&output.stdout, "output");
            let stderr = truncated(&output.stderr, "stderr");

            if output.status.success() {
                return Ok(CommandOutput::text(stdout));
            }
            let error = if stderr.trim().is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr.trim_end().to_string()
            };
            Ok(CommandOutput::failed(stdout, error))
        })
    }
}

fn truncated(raw: &[u8], label: &str) -> String {
    let mut text = String::from_utf8_lossy(raw).into_owned();
    if text.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str(&format!("\n... [{label} truncated at 1MB]"));
    }
    text
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::jobs::Request;
    use tokio_util::sync::CancellationToken;

    fn job(args: &[&str]) -> Job {
        Job::transient(Request {
            command: "sh".into(),
            args: args.iter().map(ToString::to_string).collect(),
            username: "someone".into(),
            ..Request::default()
        })
    }

    fn sh(script: &str) -> ShellCommand {
        let mut descriptor = CommandDescriptor::new("sh", "runs a script");
        descriptor.default_args = vec!["-c".into(), script.into()];
        ShellCommand::new("sh", descriptor)
    }

    #[tokio::test]
    async fn captures_stdout() {
        let command = sh("echo hello");
        let out = command
            .execute(CommandContext::default(), &job(&[]))
            .await
            .unwrap();
        assert_eq!(out.output, "hello\n");
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn invocation_args_follow_default_args() {
        let command = sh("echo \"$0 $1\"");
        let out = command
            .execute(CommandContext::default(), &job(&["first", "second"]))
            .await
            .unwrap();
        assert_eq!(out.output, "first second\n");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let command = sh("echo partial; echo broken >&2; exit 3");
        let out = command
            .execute(CommandContext::default(), &job(&[]))
            .await
            .unwrap();
        assert_eq!(out.output, "partial\n");
        assert_eq!(out.error.as_deref(), Some("broken"));
    }

    #[tokio::test]
    async fn non_zero_exit_without_stderr_reports_status() {
        let command = sh("exit 2");
        let out = command
            .execute(CommandContext::default(), &job(&[]))
            .await
            .unwrap();
        assert!(out.error.unwrap().contains("exited with"));
    }

    #[tokio::test]
    async fn missing_program_is_error() {
        let command = ShellCommand::new(
            "/definitely/not/here",
            CommandDescriptor::new("ghost", "missing"),
        );
        assert!(
            command
                .execute(CommandContext::default(), &job(&[]))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn cancellation_stops_the_child() {
        let command = sh("sleep 30");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = command
            .execute(CommandContext::new(cancel), &job(&[]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn truncates_long_output() {
        let raw = vec![b'a'; MAX_OUTPUT_BYTES + 10];
        let text = truncated(&raw, "output");
        assert!(text.ends_with("[output truncated at 1MB]"));
    }
}
