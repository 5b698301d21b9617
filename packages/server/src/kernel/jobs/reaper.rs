//! Background purge of expired failed messages using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (every REAPER_INTERVAL_SECS)
//!     │
//!     └─► JobQueue.purge_expired(now)
//!             └─► delete failed messages past their retention window
//! ```
//!
//! Job rows are never touched; only delivery records are purged.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::queue::JobQueue;

#[derive(Clone)]
pub struct QueueReaper {
    queue: Arc<dyn JobQueue>,
}

impl QueueReaper {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Purge once. Returns the number of messages removed.
    pub async fn purge_once(&self) -> Result<u64> {
        self.queue.purge_expired(Utc::now()).await
    }

    /// Start a scheduler that purges every `interval`.
    pub async fn start(self, interval: Duration) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;

        let reap_job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let reaper = self.clone();
            Box::pin(async move {
                if let Err(e) = reaper.purge_once().await {
                    tracing::error!(error = %e, "queue reaper failed");
                }
            })
        })?;

        scheduler.add(reap_job).await?;
        scheduler.start().await?;

        tracing::info!(interval_secs = interval.as_secs(), "queue reaper started");
        Ok(scheduler)
    }
}
