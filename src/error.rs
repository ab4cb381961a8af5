use crate::jobs::JobStatus;
use std::time::Duration;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error type for `jobbox`.
///
/// Store, auth and dispatch failures surface as one of these variants so
/// callers can match on them; command bodies keep using `anyhow::Result` for
/// ad-hoc context chains and these stay downcastable through it.
#[derive(Debug, Error)]
pub enum Error {
    // ── Not found ───────────────────────────────────────────────────────
    #[error("no job could be found")]
    NoJobWithId(u64),

    #[error("No logs for job")]
    NoLogsForJob(u64),

    #[error("token {0} not found")]
    TokenNotFound(String),

    #[error("command {0} not found")]
    CommandNotFound(String),

    // ── Auth ────────────────────────────────────────────────────────────
    #[error("user {user} is not allowed to run command {command}")]
    Unauthorized { user: String, command: String },

    // ── Input ───────────────────────────────────────────────────────────
    #[error("{0}")]
    InvalidArgument(String),

    // ── Execution ───────────────────────────────────────────────────────
    #[error("command {command} timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("job {id} already finished with status {status}")]
    AlreadyTerminal { id: u64, status: JobStatus },

    // ── Storage ─────────────────────────────────────────────────────────
    #[error("storage: could not {op}: {source}")]
    Storage {
        op: String,
        #[source]
        source: sqlx::Error,
    },

    // ── Rendering / config ──────────────────────────────────────────────
    #[error("template: {0}")]
    Render(String),

    #[error("config: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`] used for user-facing handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidArgument,
    Timeout,
    StorageFailure,
    AlreadyTerminal,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoJobWithId(_)
            | Self::NoLogsForJob(_)
            | Self::TokenNotFound(_)
            | Self::CommandNotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
            Self::Storage { .. } => ErrorKind::StorageFailure,
            Self::Render(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn storage(op: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Storage {
            op: op.into(),
            source,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<tera::Error> for Error {
    fn from(error: tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Render(message)
    }
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension for attaching the failed operation to a raw `sqlx` result.
pub(crate) trait StorageContext<T> {
    fn storage_op(self, op: impl FnOnce() -> String) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, sqlx::Error> {
    fn storage_op(self, op: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| Error::storage(op(), source))
    }
}
