//! Job store implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};

use consilium_core::{Error, Job, JobStatus, JobStore, JobType, Result};

/// PostgreSQL implementation of [`JobStore`].
///
/// Claim atomicity rides on `FOR UPDATE SKIP LOCKED`: concurrent dispatchers
/// each lock a distinct pending row, so a job is claimed exactly once. Rows
/// are never deleted; the table doubles as the processing audit trail.
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    /// Create a new PgJobStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");
        Ok(Job {
            id: row.get("id"),
            job_type: job_type.parse::<JobType>()?,
            payload: row.get("payload"),
            status: status.parse::<JobStatus>()?,
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Pending job count, useful for health endpoints and tests.
    pub async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, job_type: JobType, payload: JsonValue) -> Result<Job> {
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO jobs (job_type, payload, status, attempts, created_at, updated_at)
             VALUES ($1, $2, 'pending', 0, $3, $3)
             RETURNING id, job_type, payload, status, attempts, last_error,
                       created_at, updated_at",
        )
        .bind(job_type.as_str())
        .bind(&payload)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_job_row(row)
    }

    async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>> {
        let now = Utc::now();

        // FIFO by id; SKIP LOCKED keeps concurrent claimers from colliding.
        let row = sqlx::query(
            "UPDATE jobs
             SET status = 'processing', attempts = attempts + 1, updated_at = $1
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'pending' AND job_type = $2
                 ORDER BY id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, job_type, payload, status, attempts, last_error,
                       created_at, updated_at",
        )
        .bind(now)
        .bind(job_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'done', updated_at = $1
             WHERE id = $2 AND status = 'processing'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(id));
        }
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'failed', last_error = $1, updated_at = $2
             WHERE id = $3 AND status = 'processing'",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Job> {
        let row = sqlx::query(
            "SELECT id, job_type, payload, status, attempts, last_error,
                    created_at, updated_at
             FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_job_row(row),
            None => Err(Error::JobNotFound(id)),
        }
    }
}
