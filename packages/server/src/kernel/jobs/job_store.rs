//! Job record store: the table of job metadata and status.
//!
//! The store is a plain record store (create/find/update keyed by job id).
//! Status transitions go through [`JobStore::transition`], which checks the
//! state machine in [`Job::plan_transition`] before writing.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;

use super::error::JobError;
use super::job::{Job, JobId, JobStatus, JobUpdate, NewJob};

/// Trait for job record storage.
///
/// Shared across all workers; every write is a single-row update keyed by
/// job id, so no cross-job coordination is needed.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job row. Fails if the id already exists.
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError>;

    /// Look up a job. A missing id is `Ok(None)`, not an error.
    async fn find(&self, id: &JobId) -> Result<Option<Job>, JobError>;

    /// Apply a partial update. Fails with [`JobError::NotFound`] if absent.
    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<Job, JobError>;

    /// Move a job to `to`, enforcing the status state machine.
    async fn transition(
        &self,
        id: &JobId,
        to: JobStatus,
        error_text: Option<&str>,
    ) -> Result<Job, JobError> {
        let job = self
            .find(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.clone()))?;
        let update = job.plan_transition(to, Utc::now(), error_text)?;
        self.update(id, update).await
    }

    async fn mark_started(&self, id: &JobId) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Started, None).await
    }

    async fn mark_completed(&self, id: &JobId) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Completed, None).await
    }

    async fn mark_failed(&self, id: &JobId, error_text: &str) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Failed, Some(error_text)).await
    }
}

const JOB_COLUMNS: &str = "id, campaign_id, job_type, key, status, started_at, finished_at, \
                           error_text, created_at, updated_at";

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError> {
        let job = new_job.into_job(Utc::now())?;

        let result = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (id, campaign_id, job_type, key, status, started_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.id)
        .bind(job.campaign_id)
        .bind(&job.job_type)
        .bind(&job.key)
        .bind(job.status)
        .bind(job.started_at)
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(JobError::AlreadyExists(job.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<Job, JobError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = COALESCE($2, status),
                started_at = CASE WHEN $3 THEN $4 ELSE started_at END,
                finished_at = CASE WHEN $5 THEN $6 ELSE finished_at END,
                error_text = CASE WHEN $7 THEN $8 ELSE error_text END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.status)
        .bind(update.started_at.is_some())
        .bind(update.started_at.flatten())
        .bind(update.finished_at.is_some())
        .bind(update.finished_at.flatten())
        .bind(update.error_text.is_some())
        .bind(update.error_text.clone().flatten())
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or_else(|| JobError::NotFound(id.clone()))
    }

    /// Single guarded UPDATE, so the status check and the write cannot be
    /// separated by another writer.
    async fn transition(
        &self,
        id: &JobId,
        to: JobStatus,
        error_text: Option<&str>,
    ) -> Result<Job, JobError> {
        let sources: Vec<String> = to
            .allowed_sources()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let error_text = (to == JobStatus::Failed).then(|| error_text.unwrap_or_default());

        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = $2,
                started_at = CASE WHEN $3 THEN NOW() ELSE started_at END,
                finished_at = CASE WHEN $4 THEN NOW() ELSE finished_at END,
                error_text = $5,
                updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to)
        .bind(to == JobStatus::Started)
        .bind(to.is_terminal())
        .bind(error_text)
        .bind(&sources)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(job) = job {
            debug!(job_id = %id, status = %to, "job transitioned");
            return Ok(job);
        }

        // Nothing matched: either the row is missing or it is in a status
        // that cannot move to `to`.
        match self.find(id).await? {
            None => Err(JobError::NotFound(id.clone())),
            Some(current) => Err(JobError::InvalidTransition {
                id: id.clone(),
                from: current.status,
                to,
            }),
        }
    }
}
