//! Job store implementation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use vestige_core::{
    clamp_progress, defaults, new_v7, Error, JobListQuery, JobRecord, JobStats, JobStatus,
    JobStore, JobType, JobUpdate, JobWrite, NewJob, Result,
};

const JOB_COLUMNS: &str = "job_id, owner_id, job_type, status, progress_percent, title, message, \
     input_data, output_data, errors, created_at, updated_at, started_at, completed_at, expires_at";

/// PostgreSQL implementation of JobStore over the `job_log` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a `job_log` row into a JobRecord.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<JobRecord> {
        let job_type: String = row.try_get("job_type").map_err(Error::Database)?;
        let status: String = row.try_get("status").map_err(Error::Database)?;
        Ok(JobRecord {
            job_id: row.try_get("job_id").map_err(Error::Database)?,
            owner_id: row.try_get("owner_id").map_err(Error::Database)?,
            job_type: job_type
                .parse()
                .map_err(|_| Error::Storage(format!("unknown job type in row: {}", job_type)))?,
            status: status
                .parse()
                .map_err(|_| Error::Storage(format!("unknown job status in row: {}", status)))?,
            progress_percent: row.try_get("progress_percent").map_err(Error::Database)?,
            title: row.try_get("title").map_err(Error::Database)?,
            message: row.try_get("message").map_err(Error::Database)?,
            input_data: row.try_get("input_data").map_err(Error::Database)?,
            output_data: row.try_get("output_data").map_err(Error::Database)?,
            errors: row.try_get("errors").map_err(Error::Database)?,
            created_at: row.try_get("created_at").map_err(Error::Database)?,
            updated_at: row.try_get("updated_at").map_err(Error::Database)?,
            started_at: row.try_get("started_at").map_err(Error::Database)?,
            completed_at: row.try_get("completed_at").map_err(Error::Database)?,
            expires_at: row.try_get("expires_at").map_err(Error::Database)?,
        })
    }

    fn not_found(job_id: Uuid) -> Error {
        Error::NotFound(format!("job {}", job_id))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        if job.owner_id.is_empty() {
            return Err(Error::Validation("owner id must not be empty".to_string()));
        }
        let job_id = new_v7();
        let now = Utc::now();
        let expires_at = now + job.retention.max(Duration::zero());

        let row = sqlx::query(&format!(
            "INSERT INTO job_log (job_id, owner_id, job_type, status, progress_percent, title,
                                  message, input_data, errors, created_at, updated_at, expires_at)
             VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6, '{{}}', $7, $7, $8)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(&job.owner_id)
        .bind(job.job_type.as_str())
        .bind(&job.title)
        .bind(defaults::MESSAGE_QUEUED)
        .bind(&job.input_data)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_job_row(row)
    }

    async fn update(&self, owner_id: &str, job_id: Uuid, update: JobUpdate) -> Result<JobWrite> {
        let now = Utc::now();
        let status = update.status.map(JobStatus::as_str);
        let expires_at = if update.is_terminal() {
            update.retention.map(|r| now + r.max(Duration::zero()))
        } else {
            None
        };

        // Conditional on non-terminal status so a terminal record is never rewritten,
        // even when two writers race.
        let row = sqlx::query(&format!(
            "UPDATE job_log SET
                 status = COALESCE($3::text, status),
                 progress_percent = LEAST(100, GREATEST(progress_percent, COALESCE($4, progress_percent))),
                 message = COALESCE($5, message),
                 output_data = COALESCE($6, output_data),
                 errors = COALESCE($7, errors),
                 started_at = CASE WHEN $3::text = 'processing' AND started_at IS NULL
                                   THEN $8 ELSE started_at END,
                 completed_at = CASE WHEN $3::text IN ('completed', 'partial', 'failed')
                                     THEN $8 ELSE completed_at END,
                 expires_at = COALESCE($9, expires_at),
                 updated_at = $8
             WHERE job_id = $1 AND owner_id = $2
               AND status IN ('pending', 'processing')
               AND expires_at > $8
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(owner_id)
        .bind(status)
        .bind(update.progress_percent.map(clamp_progress))
        .bind(&update.message)
        .bind(&update.output_data)
        .bind(&update.errors)
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Self::parse_job_row(row).map(JobWrite::Applied);
        }

        // Nothing written: either terminal, or not visible to this owner.
        let current = self.find(owner_id, job_id).await?;
        debug!(
            subsystem = "db",
            component = "jobs",
            op = "update",
            job_id = %job_id,
            status = %current.status,
            "Update skipped for terminal job"
        );
        Ok(JobWrite::Terminal(current))
    }

    async fn find(&self, owner_id: &str, job_id: Uuid) -> Result<JobRecord> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_log
             WHERE job_id = $1 AND owner_id = $2 AND expires_at > $3"
        ))
        .bind(job_id)
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_job_row(row),
            None => Err(Self::not_found(job_id)),
        }
    }

    async fn list(&self, owner_id: &str, query: &JobListQuery) -> Result<(Vec<JobRecord>, i64)> {
        query.validate()?;
        let now = Utc::now();
        let job_type = query.job_type.map(JobType::as_str);
        let status = query.status.map(JobStatus::as_str);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_log
             WHERE owner_id = $1 AND expires_at > $2
               AND ($3::text IS NULL OR job_type = $3)
               AND ($4::text IS NULL OR status = $4)",
        )
        .bind(owner_id)
        .bind(now)
        .bind(job_type)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_log
             WHERE owner_id = $1 AND expires_at > $2
               AND ($3::text IS NULL OR job_type = $3)
               AND ($4::text IS NULL OR status = $4)
             ORDER BY created_at DESC, job_id DESC
             LIMIT $5 OFFSET $6"
        ))
        .bind(owner_id)
        .bind(now)
        .bind(job_type)
        .bind(status)
        .bind(i64::from(query.per_page))
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let jobs = rows
            .into_iter()
            .map(Self::parse_job_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn stats(&self, owner_id: &str) -> Result<JobStats> {
        let rows = sqlx::query(
            "SELECT status, job_type, COUNT(*) AS count FROM job_log
             WHERE owner_id = $1 AND expires_at > $2
             GROUP BY status, job_type",
        )
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.get("status");
            let job_type: String = row.get("job_type");
            let count: i64 = row.get("count");
            match (status.parse::<JobStatus>(), job_type.parse::<JobType>()) {
                (Ok(status), Ok(job_type)) => stats.record(status, job_type, count),
                _ => warn!(
                    subsystem = "db",
                    component = "jobs",
                    op = "stats",
                    status = %status,
                    job_type = %job_type,
                    "Skipping rows with unknown status or type"
                ),
            }
        }
        Ok(stats)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM job_log WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
