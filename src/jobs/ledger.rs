use super::{Job, JobFilter, JobStatus, Request};
use crate::error::{Error, Result, StorageContext};
use crate::store::{Store, id_from_db, id_to_db};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::TryStreamExt;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Owns job identity assignment and the single Running → terminal transition.
#[derive(Clone, Debug)]
pub struct JobLedger {
    store: Store,
}

impl JobLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist a new Running job. The id comes from the table's
    /// AUTOINCREMENT counter, so it is strictly increasing and never reused.
    pub async fn create(&self, request: Request) -> Result<Job> {
        let start_time = Utc::now();
        let encoded = serde_json::to_string(&request)
            .map_err(|e| Error::storage("encode job request", sqlx::Error::Encode(Box::new(e))))?;

        let raw_id: i64 = sqlx::query_scalar(
            "INSERT INTO jobs (request, status, start_time) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&encoded)
        .bind(JobStatus::Running.as_str())
        .bind(timestamp(start_time))
        .fetch_one(self.store.pool())
        .await
        .storage_op(|| format!("create job for command {}", request.command))?;

        let id = id_from_db(raw_id);
        tracing::debug!(job_id = id, command = %request.command, "job created");

        Ok(Job {
            id,
            request,
            status: JobStatus::Running,
            start_time,
            end_time: None,
        })
    }

    /// Move a Running job to `status`. The first terminal write wins: a job
    /// that already finished is left untouched and `AlreadyTerminal` is
    /// returned.
    pub async fn finish(&self, id: u64, status: JobStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::invalid(format!(
                "cannot finish job {id} with non-terminal status {status}"
            )));
        }
        let db_id = id_to_db(id)?;
        let op = || format!("finish job {id}");

        let mut tx = self.store.pool().begin().await.storage_op(op)?;
        let updated = sqlx::query(
            "UPDATE jobs SET status = $1, end_time = $2 WHERE id = $3 AND status = $4",
        )
        .bind(status.as_str())
        .bind(timestamp(Utc::now()))
        .bind(db_id)
        .bind(JobStatus::Running.as_str())
        .execute(&mut *tx)
        .await
        .storage_op(op)?;

        if updated.rows_affected() == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                .bind(db_id)
                .fetch_optional(&mut *tx)
                .await
                .storage_op(op)?;
            tx.rollback().await.storage_op(op)?;

            return match current {
                None => Err(Error::NoJobWithId(id)),
                Some(raw) => {
                    let current = raw.parse::<JobStatus>().map_err(|e| {
                        Error::storage(op(), sqlx::Error::Decode(Box::new(e)))
                    })?;
                    tracing::warn!(job_id = id, current = %current, requested = %status, "rejected second finish");
                    Err(Error::AlreadyTerminal {
                        id,
                        status: current,
                    })
                }
            };
        }

        tx.commit().await.storage_op(op)?;
        tracing::debug!(job_id = id, status = %status, "job finished");
        Ok(())
    }

    pub async fn get(&self, id: u64) -> Result<Job> {
        let db_id = id_to_db(id)?;
        let row = sqlx::query(
            "SELECT id, request, status, start_time, end_time FROM jobs WHERE id = $1",
        )
        .bind(db_id)
        .fetch_optional(self.store.pool())
        .await
        .storage_op(|| format!("get job {id}"))?;

        match row {
            Some(row) => map_job_row(&row).storage_op(|| format!("decode job {id}")),
            None => Err(Error::NoJobWithId(id)),
        }
    }

    /// Scan jobs newest first, keeping those accepted by the filter, until
    /// `filter.limit` have been collected.
    ///
    /// The scan is a single streamed SELECT, so it reads one snapshot and
    /// never holds the write lock.
    pub async fn find(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut rows = sqlx::query(
            "SELECT id, request, status, start_time, end_time FROM jobs ORDER BY id DESC",
        )
        .fetch(self.store.pool());

        while let Some(row) = rows
            .try_next()
            .await
            .storage_op(|| "scan jobs".to_string())?
        {
            let job = map_job_row(&row).storage_op(|| "decode job during scan".to_string())?;
            if filter.matches(&job) {
                found.push(job);
                if found.len() >= filter.limit {
                    break;
                }
            }
        }
        Ok(found)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn map_job_row(row: &SqliteRow) -> std::result::Result<Job, sqlx::Error> {
    let request_raw: String = row.try_get("request")?;
    let status_raw: String = row.try_get("status")?;
    let start_raw: String = row.try_get("start_time")?;
    let end_raw: Option<String> = row.try_get("end_time")?;

    Ok(Job {
        id: id_from_db(row.try_get("id")?),
        request: serde_json::from_str(&request_raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        status: status_raw
            .parse()
            .map_err(|e: Error| sqlx::Error::Decode(Box::new(e)))?,
        start_time: parse_timestamp(&start_raw)?,
        end_time: end_raw.as_deref().map(parse_timestamp).transpose()?,
    })
}
