//! Status bookkeeping around job execution.
//!
//! Every worker runs its job-type logic through [`LifecycleController::run`]:
//!
//! ```text
//! run(id, kind, execute)
//!     │
//!     ├─► mark_started        (missing row aborts here, execute never runs)
//!     ├─► execute.await
//!     ├─► Ok  ─► mark_completed
//!     └─► Err ─► mark_failed(message or "<kind>_failed") ─► Err(Execution)
//! ```
//!
//! The controller never retries. Failures are recorded and then handed back
//! to the caller so the delivery layer can apply its own policy.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::error::JobError;
use super::job::{Job, JobId};
use super::job_store::JobStore;
use super::payload::JobKind;

#[derive(Clone)]
pub struct LifecycleController {
    store: Arc<dyn JobStore>,
}

impl LifecycleController {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Run `execute` for job `id`, recording `started` before it and
    /// `completed`/`failed` after it.
    ///
    /// Returns the final job row on success. On failure the row has already
    /// been marked `failed` and [`JobError::Execution`] carries the original
    /// error.
    pub async fn run<F>(&self, id: &JobId, kind: JobKind, execute: F) -> Result<Job, JobError>
    where
        F: Future<Output = anyhow::Result<()>> + Send,
    {
        let started = self.store.mark_started(id).await.map_err(|e| {
            if let JobError::NotFound(_) = e {
                error!(job_id = %id, job_type = %kind, "job has no store row; producer did not record it");
            }
            e
        })?;
        debug!(job_id = %id, job_type = %started.job_type, "job started");

        match execute.await {
            Ok(()) => {
                let job = self.store.mark_completed(id).await?;
                debug!(job_id = %id, job_type = %job.job_type, "job completed");
                Ok(job)
            }
            Err(source) => {
                let message = failure_message(&source, kind);
                warn!(job_id = %id, job_type = %kind, error = %message, "job failed");
                self.store.mark_failed(id, &message).await?;
                Err(JobError::Execution {
                    id: id.clone(),
                    message,
                    source,
                })
            }
        }
    }
}

/// Human-readable summary stored in `error_text`.
fn failure_message(err: &anyhow::Error, kind: JobKind) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        kind.fallback_error().to_string()
    } else {
        message
    }
}
