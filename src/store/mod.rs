//! Embedded single-file store backing the job ledger, job logs and tokens.

use crate::error::{Error, Result, StorageContext};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS jobbox_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
         id         INTEGER PRIMARY KEY AUTOINCREMENT,
         request    TEXT NOT NULL,
         status     TEXT NOT NULL,
         start_time TEXT NOT NULL,
         end_time   TEXT
     )",
    "CREATE TABLE IF NOT EXISTS job_logs (
         job_id   INTEGER PRIMARY KEY,
         last_seq INTEGER NOT NULL DEFAULT 0,
         error    TEXT
     )",
    "CREATE TABLE IF NOT EXISTS job_log_lines (
         job_id INTEGER NOT NULL REFERENCES job_logs(job_id),
         seq    INTEGER NOT NULL,
         line   TEXT NOT NULL,
         PRIMARY KEY (job_id, seq)
     )",
    "CREATE TABLE IF NOT EXISTS tokens (
         seq          INTEGER PRIMARY KEY AUTOINCREMENT,
         token_id     TEXT NOT NULL UNIQUE,
         user_link    TEXT NOT NULL,
         user_id      TEXT NOT NULL,
         channel_link TEXT NOT NULL,
         text         TEXT NOT NULL,
         created_at   TEXT NOT NULL
     )",
];

/// Handle on the SQLite database. Cheap to clone; all state lives in the file.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                Error::Config(format!(
                    "failed to create database directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .storage_op(|| format!("open database {}", path.display()))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database. One connection, since every SQLite
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .storage_op(|| "open in-memory database".to_string())?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and bootstrap the schema.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        ensure_schema_version(&pool).await?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .storage_op(|| "create schema".to_string())?;
        }
        tracing::debug!("store schema ready");
        Ok(Self { pool })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .storage_op(|| "create jobbox_schema_meta table".to_string())?;

    let stored: Option<(String,)> =
        sqlx::query_as("SELECT value FROM jobbox_schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .storage_op(|| "load schema version".to_string())?;

    if let Some((value,)) = stored {
        let parsed = value
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("invalid schema version value: {value}")))?;
        if parsed != SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "incompatible schema version: stored={parsed}, expected={SCHEMA_VERSION}"
            )));
        }
        return Ok(());
    }

    sqlx::query("INSERT INTO jobbox_schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .storage_op(|| "persist schema version".to_string())?;
    Ok(())
}

/// Job ids are `u64` in the API and `INTEGER` (i64) in SQLite.
pub(crate) fn id_to_db(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::invalid(format!("job id {id} out of range")))
}

pub(crate) fn id_from_db(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("jobbox.db");
        let store = Store::open(&path).await.unwrap();
        assert!(path.exists());

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('jobs', 'job_logs', 'job_log_lines', 'tokens')",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn reopen_keeps_schema_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobbox.db");
        let store = Store::open(&path).await.unwrap();
        store.close().await;
        Store::open(&path).await.unwrap();
    }

    #[tokio::test]
    async fn incompatible_schema_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobbox.db");
        let store = Store::open(&path).await.unwrap();
        sqlx::query("UPDATE jobbox_schema_meta SET value = '99' WHERE key = 'schema_version'")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;

        let err = Store::open(&path).await.unwrap_err();
        assert!(err.to_string().contains("incompatible schema version"));
    }
}
