use crate::error::{Error, Result, StorageContext};
use crate::store::{Store, id_to_db};
use futures_util::TryStreamExt;

/// Everything logged for one job: its output lines in append order and the
/// last error recorded for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobLog {
    pub output: String,
    pub error: String,
}

impl JobLog {
    /// `None` when no error was recorded.
    pub fn error(&self) -> Option<&str> {
        if self.error.is_empty() {
            None
        } else {
            Some(self.error.as_str())
        }
    }
}

/// Append-only per-job output plus a single overwritable error slot.
#[derive(Clone, Debug)]
pub struct LogStore {
    store: Store,
}

impl LogStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append `line` to the job's output. Empty lines are not stored.
    pub async fn append(&self, job_id: u64, line: &str) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        let db_id = id_to_db(job_id)?;
        let op = || format!("append log line to job {job_id}");

        let mut tx = self.store.pool().begin().await.storage_op(op)?;
        ensure_container(&mut tx, db_id).await.storage_op(op)?;

        let seq: i64 = sqlx::query_scalar(
            "UPDATE job_logs SET last_seq = last_seq + 1 WHERE job_id = $1 RETURNING last_seq",
        )
        .bind(db_id)
        .fetch_one(&mut *tx)
        .await
        .storage_op(op)?;

        sqlx::query("INSERT INTO job_log_lines (job_id, seq, line) VALUES ($1, $2, $3)")
            .bind(db_id)
            .bind(seq)
            .bind(line)
            .execute(&mut *tx)
            .await
            .storage_op(op)?;

        tx.commit().await.storage_op(op)?;
        tracing::debug!(job_id, seq, "log line appended");
        Ok(())
    }

    /// Record the job's error, replacing any earlier one. `None` is a no-op.
    pub async fn set_error(&self, job_id: u64, error: Option<&str>) -> Result<()> {
        let Some(error) = error else {
            return Ok(());
        };
        let db_id = id_to_db(job_id)?;
        let op = || format!("set error for job {job_id}");

        let mut tx = self.store.pool().begin().await.storage_op(op)?;
        ensure_container(&mut tx, db_id).await.storage_op(op)?;
        sqlx::query("UPDATE job_logs SET error = $1 WHERE job_id = $2")
            .bind(error)
            .bind(db_id)
            .execute(&mut *tx)
            .await
            .storage_op(op)?;
        tx.commit().await.storage_op(op)?;
        tracing::debug!(job_id, "job error recorded");
        Ok(())
    }

    /// Read a job's log. Fails with `NoLogsForJob` until something has been
    /// appended or an error set.
    pub async fn get(&self, job_id: u64) -> Result<JobLog> {
        let db_id = id_to_db(job_id)?;
        let op = || format!("read logs of job {job_id}");

        // one read transaction so the lines and the error come from the
        // same snapshot
        let mut tx = self.store.pool().begin().await.storage_op(op)?;

        let container: Option<(Option<String>,)> =
            sqlx::query_as("SELECT error FROM job_logs WHERE job_id = $1")
                .bind(db_id)
                .fetch_optional(&mut *tx)
                .await
                .storage_op(op)?;
        let Some((error,)) = container else {
            return Err(Error::NoLogsForJob(job_id));
        };

        let mut output = String::new();
        {
            let mut lines = sqlx::query_scalar::<_, String>(
                "SELECT line FROM job_log_lines WHERE job_id = $1 ORDER BY seq ASC",
            )
            .bind(db_id)
            .fetch(&mut *tx);
            while let Some(line) = lines.try_next().await.storage_op(op)? {
                output.push_str(&line);
            }
        }
        tx.commit().await.storage_op(op)?;

        Ok(JobLog {
            output,
            error: error.unwrap_or_default(),
        })
    }
}

async fn ensure_container(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    db_id: i64,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO job_logs (job_id) VALUES ($1) ON CONFLICT (job_id) DO NOTHING")
        .bind(db_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
