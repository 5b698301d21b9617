//! Job infrastructure: queues, job records, and the lifecycle around them.
//!
//! - [`JobQueue`] - Named durable queues with leased delivery
//! - [`JobStore`] - Job record table (status, timestamps, error text)
//! - [`JobProducer`] - Enqueue + record, used by the HTTP layer
//! - [`LifecycleController`] - `started -> completed | failed` bookkeeping
//! - [`JobWorker`] - Long-running service binding one queue to one executor
//! - [`QueueReaper`] - Purges failed messages past their retention window
//!
//! # Architecture
//!
//! ```text
//! POST /campaigns/:id/discover
//!     │
//!     └─► JobProducer.enqueue(payload)
//!             ├─► JobQueue.enqueue_held(queue, task_type, json)  -> id
//!             ├─► JobStore.create(id, status = queued)
//!             └─► JobQueue.release(id)   (discard on create failure)
//!
//! JobWorker (crawl | qualify | dispatch)
//!     │
//!     ├─► JobQueue.claim
//!     ├─► LifecycleController.run(id, executor.execute(payload))
//!     └─► JobQueue.ack | JobQueue.fail
//! ```
//!
//! Job-type logic lives in the domains; this module only provides the
//! plumbing.

mod error;
mod job;
mod job_store;
mod lifecycle;
mod memory;
mod payload;
mod producer;
mod queue;
mod reaper;
mod worker;

pub use error::JobError;
pub use job::{Job, JobId, JobStatus, JobUpdate, NewJob};
pub use job_store::{JobStore, PostgresJobStore};
pub use lifecycle::LifecycleController;
pub use memory::{InMemoryJobQueue, InMemoryJobStore};
pub use payload::{
    CrawlConfig, CrawlSeedPayload, DispatchCampaignPayload, JobKind, JobPayload, PayloadError,
    QualifyCampaignPayload, SeedType,
};
pub use producer::JobProducer;
pub use queue::{
    Delivery, EnqueueOptions, JobQueue, MessageState, PostgresJobQueue, QueueCounts,
};
pub use reaper::QueueReaper;
pub use worker::{JobExecutor, JobWorker, JobWorkerConfig};
