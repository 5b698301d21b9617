use thiserror::Error;

use super::job::{JobId, JobStatus};
use super::payload::PayloadError;

/// Errors raised by the job store, queue plumbing, and lifecycle controller.
#[derive(Debug, Error)]
pub enum JobError {
    /// No store row for the id. When a delivered job hits this, the producer
    /// enqueued without recording the row.
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    AlreadyExists(JobId),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id} cannot be created as {status}")]
    InvalidInitialStatus { id: JobId, status: JobStatus },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The job-type logic failed. `message` is what was written to
    /// `error_text`.
    #[error("job {id} failed: {message}")]
    Execution {
        id: JobId,
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("queue error: {0}")]
    Queue(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl JobError {
    /// True when the job row was already terminal, so the delivery that
    /// caused this is a duplicate and must not run again.
    pub fn is_already_finished(&self) -> bool {
        matches!(self, JobError::InvalidTransition { from, .. } if from.is_terminal())
    }
}
