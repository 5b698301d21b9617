//! Job record model and its status state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::error::JobError;

// ============================================================================
// Identity
// ============================================================================

/// Job identifier, assigned by the queue at enqueue time and reused as the
/// job store's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh, time-ordered id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses a record may be in when moving to `self`.
    ///
    /// `started -> started` is allowed so that a delivery redelivered after
    /// its lease expired (the previous worker died) can run again. Terminal
    /// rows are never reopened.
    pub fn allowed_sources(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[],
            JobStatus::Started => &[JobStatus::Queued, JobStatus::Started],
            JobStatus::Completed | JobStatus::Failed => &[JobStatus::Started],
        }
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        to.allowed_sources().contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// A job row as stored in the job record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub campaign_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub job_type: String,
    pub key: Option<String>,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a job row. Producers create rows in `queued`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewJob {
    #[builder(setter(into))]
    pub id: JobId,
    #[builder(default)]
    pub campaign_id: Option<Uuid>,
    #[builder(setter(into))]
    pub job_type: String,
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default, setter(strip_option, into))]
    pub key: Option<String>,
}

impl NewJob {
    /// Materialize the row this input describes.
    ///
    /// Rows can only be born `queued` or `started`: a terminal row created
    /// directly would skip `started` and break the error/finish invariants.
    pub fn into_job(self, now: DateTime<Utc>) -> Result<Job, JobError> {
        if self.status.is_terminal() {
            return Err(JobError::InvalidInitialStatus {
                id: self.id,
                status: self.status,
            });
        }

        Ok(Job {
            started_at: (self.status == JobStatus::Started).then_some(now),
            id: self.id,
            campaign_id: self.campaign_id,
            job_type: self.job_type,
            key: self.key,
            status: self.status,
            finished_at: None,
            error_text: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a job row. `None` leaves a field untouched; for the
/// nullable columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub finished_at: Option<Option<DateTime<Utc>>>,
    pub error_text: Option<Option<String>>,
}

impl JobUpdate {
    pub fn apply(&self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(started_at) = self.started_at {
            job.started_at = started_at;
        }
        if let Some(finished_at) = self.finished_at {
            job.finished_at = finished_at;
        }
        if let Some(error_text) = &self.error_text {
            job.error_text = error_text.clone();
        }
        job.updated_at = now;
    }
}

impl Job {
    /// Plan the update that moves this job to `to`.
    ///
    /// - `started`: stamps `started_at`, clears `error_text`
    /// - `completed`: stamps `finished_at`, `error_text` stays null
    /// - `failed`: stamps `finished_at`, records `error_text`
    ///
    /// Anything not allowed by [`JobStatus::allowed_sources`] is rejected,
    /// including a second terminal transition.
    pub fn plan_transition(
        &self,
        to: JobStatus,
        now: DateTime<Utc>,
        error_text: Option<&str>,
    ) -> Result<JobUpdate, JobError> {
        let rejected = || JobError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        };
        if !self.status.can_transition_to(to) {
            return Err(rejected());
        }

        let update = match to {
            JobStatus::Started => JobUpdate {
                status: Some(to),
                started_at: Some(Some(now)),
                error_text: Some(None),
                ..Default::default()
            },
            JobStatus::Completed => JobUpdate {
                status: Some(to),
                finished_at: Some(Some(now)),
                error_text: Some(None),
                ..Default::default()
            },
            JobStatus::Failed => JobUpdate {
                status: Some(to),
                finished_at: Some(Some(now)),
                error_text: Some(Some(error_text.unwrap_or_default().to_string())),
                ..Default::default()
            },
            JobStatus::Queued => return Err(rejected()),
        };

        Ok(update)
    }
}
