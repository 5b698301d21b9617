use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use super::error::JobError;
use super::job::{Job, JobId, NewJob};
use super::job_store::JobStore;
use super::payload::JobPayload;
use super::queue::{EnqueueOptions, JobQueue};

/// Enqueues validated payloads and records the matching job rows.
///
/// Every successful enqueue is paired with a `queued` row under the same id
/// before the caller gets the id back. The queue message stays held until
/// that row exists.
#[derive(Clone)]
pub struct JobProducer {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobStore>,
    options: EnqueueOptions,
}

impl JobProducer {
    pub fn new(queue: Arc<dyn JobQueue>, store: Arc<dyn JobStore>) -> Self {
        Self {
            queue,
            store,
            options: EnqueueOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EnqueueOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn enqueue(
        &self,
        payload: &JobPayload,
        campaign_id: Option<Uuid>,
    ) -> Result<Job, JobError> {
        payload.validate()?;
        let kind = payload.kind();

        // Held until the row exists, so no worker can claim a job the store
        // does not know about yet.
        let id = self
            .queue
            .enqueue_held(kind.queue_name(), kind.task_type(), payload.to_json(), self.options)
            .await?;

        let new_job = NewJob::builder()
            .id(id.clone())
            .campaign_id(campaign_id)
            .job_type(kind.task_type())
            .build();

        let job = match self.store.create(new_job).await {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %id, queue = %kind.queue_name(), error = %e, "failed to record enqueued job");
                if let Err(discard_err) = self.queue.discard(&id).await {
                    error!(job_id = %id, error = %discard_err, "failed to discard held message");
                }
                return Err(e);
            }
        };

        if let Err(e) = self.queue.release(&id).await {
            error!(job_id = %id, queue = %kind.queue_name(), error = %e, "failed to release enqueued job");
            return Err(e.into());
        }

        info!(job_id = %id, queue = %kind.queue_name(), "job enqueued");
        Ok(job)
    }

    pub async fn find(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        self.store.find(id).await
    }
}
