//! Job worker service for processing queued jobs.
//!
//! A `JobWorker` binds one queue to one [`JobExecutor`] and:
//! - Polls the queue for deliverable messages (claim under a lease)
//! - Parses each payload into the executor's [`JobPayload`] variant
//! - Runs the executor through the [`LifecycleController`]
//! - Acks on success, fails the message otherwise
//! - Heartbeats the lease while a job runs
//!
//! # Architecture
//!
//! ```text
//! JobWorker (one per queue)
//!     │
//!     ├─► JobQueue.claim(queue, worker_id, batch_size)
//!     ├─► LifecycleController.run(id, kind, async {
//!     │       JobPayload::parse(kind, payload)?
//!     │       JobExecutor.execute(id, payload)
//!     │   })
//!     └─► JobQueue.ack(id, worker_id) | JobQueue.fail(id, worker_id, reason)
//! ```
//!
//! A payload that fails to parse is an execution failure: the row goes
//! `started -> failed` and the worker keeps running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::JobError;
use super::job::{Job, JobId};
use super::job_store::JobStore;
use super::lifecycle::LifecycleController;
use super::payload::{JobKind, JobPayload};
use super::queue::{Delivery, JobQueue};

/// Job-type logic bound to a worker.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// The kind this executor handles. Determines the queue it is bound to.
    fn kind(&self) -> JobKind;

    async fn execute(&self, id: &JobId, payload: JobPayload) -> Result<()>;
}

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum number of messages to claim at once
    pub batch_size: i64,
    /// How long to wait when the queue is empty
    pub poll_interval: Duration,
    /// How often to extend the lease of a running job
    pub heartbeat_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(20),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    /// Heartbeat at a third of the lease so two missed beats still fit.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.heartbeat_interval = (lease / 3).max(Duration::from_millis(100));
        self
    }
}

/// A worker that consumes one named queue.
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    lifecycle: LifecycleController,
    executor: Arc<dyn JobExecutor>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self::with_config(queue, store, executor, JobWorkerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn JobExecutor>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            queue,
            lifecycle: LifecycleController::new(store),
            executor,
            config,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.executor.kind()
    }

    pub fn queue_name(&self) -> &'static str {
        self.kind().queue_name()
    }

    /// Run one delivery through the lifecycle controller.
    pub async fn handle(&self, delivery: Delivery) -> Result<Job, JobError> {
        let kind = self.kind();
        let executor = self.executor.clone();
        let id = delivery.id.clone();
        let Delivery {
            task_type, payload, ..
        } = delivery;

        self.lifecycle
            .run(&id, kind, async {
                if task_type != kind.task_type() {
                    bail!(
                        "unexpected task type {task_type} on queue {}",
                        kind.queue_name()
                    );
                }
                let payload = JobPayload::parse(kind, &payload)?;
                executor.execute(&id, payload).await
            })
            .await
    }

    /// Handle a delivery and settle it on the queue.
    ///
    /// The heartbeat is not tied to shutdown: a job still running while the
    /// worker stops keeps its lease until it finishes.
    async fn process_delivery(&self, delivery: Delivery) {
        let id = delivery.id.clone();
        let attempts = delivery.attempts;
        let worker_id = self.config.worker_id.as_str();

        let result = self
            .handle_with_heartbeat(delivery, CancellationToken::new())
            .await;

        let settled = match result {
            Ok(_) => self.queue.ack(&id, worker_id).await,
            Err(e) if e.is_already_finished() => {
                warn!(job_id = %id, attempts, error = %e, "duplicate delivery of finished job");
                self.queue.ack(&id, worker_id).await
            }
            Err(e) => {
                let reason = match &e {
                    JobError::Execution { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                if !matches!(e, JobError::Execution { .. }) {
                    error!(job_id = %id, error = %e, "job could not be run");
                }
                self.queue.fail(&id, worker_id, &reason).await
            }
        };

        if let Err(e) = settled {
            error!(job_id = %id, error = %e, "failed to settle delivery");
        }
    }

    /// Handle a delivery while periodically extending its lease.
    async fn handle_with_heartbeat(
        &self,
        delivery: Delivery,
        cancel: CancellationToken,
    ) -> Result<Job, JobError> {
        let queue = self.queue.clone();
        let job_id = delivery.id.clone();
        let worker_id = self.config.worker_id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;

        let heartbeat_cancel = cancel.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = queue.heartbeat(&job_id, &worker_id).await {
                            warn!(job_id = %job_id, error = %e, "heartbeat failed");
                        }
                    }
                }
            }
        });

        let result = self.handle(delivery).await;

        // Stop heartbeat
        cancel.cancel();
        let _ = heartbeat_handle.await;

        result
    }

    /// Claim one batch and process it. Returns how many deliveries were
    /// handled.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<usize> {
        if shutdown.is_cancelled() {
            return Ok(0);
        }

        let deliveries = self
            .queue
            .claim(self.queue_name(), &self.config.worker_id, self.config.batch_size)
            .await?;

        if deliveries.is_empty() {
            return Ok(0);
        }

        let count = deliveries.len();
        debug!(queue = %self.queue_name(), count, "claimed deliveries");

        let handles = deliveries
            .into_iter()
            .map(|delivery| self.process_delivery(delivery));
        futures::future::join_all(handles).await;

        Ok(count)
    }

    /// Poll until `shutdown` is cancelled. In-flight jobs finish, with their
    /// leases still extended, before this returns.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            queue = %self.queue_name(),
            batch_size = self.config.batch_size,
            "job worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let idle = match self.run_once(&shutdown).await {
                Ok(count) => count == 0,
                Err(e) => {
                    error!(queue = %self.queue_name(), error = %e, "failed to claim jobs");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.config.worker_id, queue = %self.queue_name(), "job worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::{
        DispatchCampaignPayload, EnqueueOptions, InMemoryJobQueue, InMemoryJobStore, JobProducer,
        JobStatus, NewJob,
    };
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingExecutor {
        kind: JobKind,
        fail_with: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl RecordingExecutor {
        fn new(kind: JobKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_with: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(kind: JobKind, message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_with: Some(message),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        fn kind(&self) -> JobKind {
            self.kind
        }

        async fn execute(&self, _id: &JobId, payload: JobPayload) -> Result<()> {
            payload.expect_kind(self.kind)?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(message) => Err(anyhow!(message)),
                None => Ok(()),
            }
        }
    }

    struct Fixture {
        queue: Arc<InMemoryJobQueue>,
        store: Arc<InMemoryJobStore>,
        producer: JobProducer,
    }

    impl Fixture {
        fn new() -> Self {
            let queue = Arc::new(InMemoryJobQueue::new());
            let store = Arc::new(InMemoryJobStore::new());
            let producer = JobProducer::new(queue.clone(), store.clone());
            Self {
                queue,
                store,
                producer,
            }
        }

        fn worker(&self, executor: Arc<RecordingExecutor>) -> JobWorker {
            JobWorker::with_config(
                self.queue.clone(),
                self.store.clone(),
                executor,
                JobWorkerConfig::with_worker_id("test-worker"),
            )
        }

        async fn enqueue_dispatch(&self) -> JobId {
            let payload = JobPayload::Dispatch(DispatchCampaignPayload {
                campaign_id: "c1".to_string(),
            });
            self.producer.enqueue(&payload, None).await.unwrap().id
        }
    }

    #[tokio::test]
    async fn successful_delivery_completes_job_and_acks() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::new(JobKind::Dispatch);
        let worker = fixture.worker(executor.clone());
        let id = fixture.enqueue_dispatch().await;

        let handled = worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(handled, 1);
        assert_eq!(executor.calls(), 1);
        let job = fixture.store.find(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error_text.is_none());
        assert_eq!(fixture.queue.len().await, 0);
    }

    #[tokio::test]
    async fn failed_delivery_records_error_and_is_not_redelivered() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::failing(JobKind::Dispatch, "network timeout");
        let worker = fixture.worker(executor.clone());
        let id = fixture.enqueue_dispatch().await;

        worker.run_once(&CancellationToken::new()).await.unwrap();
        let again = worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(again, 0);
        assert_eq!(executor.calls(), 1);
        let job = fixture.store.find(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_text.as_deref(), Some("network timeout"));
        assert!(job.finished_at.is_some());
        assert_eq!(
            fixture.queue.failed_reason(&id).await.as_deref(),
            Some("network timeout")
        );
    }

    #[tokio::test]
    async fn malformed_payload_fails_job_without_running_executor() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::new(JobKind::Crawl);
        let worker = fixture.worker(executor.clone());
        let id = fixture
            .queue
            .enqueue(
                "crawl",
                "crawl.seed",
                json!({"campaignId": "c1", "seed_type": "hashtag", "seed_value": "x"}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        fixture
            .store
            .create(NewJob::builder().id(id.clone()).job_type("crawl.seed").build())
            .await
            .unwrap();

        worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(executor.calls(), 0);
        let job = fixture.store.find(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_some());
        assert!(job
            .error_text
            .as_deref()
            .is_some_and(|text| text.starts_with("invalid crawl.seed payload")));
    }

    #[tokio::test]
    async fn delivery_without_row_is_failed_on_queue_only() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::new(JobKind::Dispatch);
        let worker = fixture.worker(executor.clone());
        let id = fixture
            .queue
            .enqueue(
                "dispatch",
                "dispatch.campaign",
                json!({"campaignId": "c1"}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(executor.calls(), 0);
        assert_eq!(fixture.store.len().await, 0);
        let reason = fixture.queue.failed_reason(&id).await.unwrap();
        assert!(reason.contains("not found"));
    }

    #[tokio::test]
    async fn duplicate_delivery_of_finished_job_is_acked() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::new(JobKind::Dispatch);
        let worker = fixture.worker(executor.clone());
        let id = fixture.enqueue_dispatch().await;
        worker.run_once(&CancellationToken::new()).await.unwrap();
        let finished = fixture.store.find(&id).await.unwrap();

        // Same id delivered a second time
        let duplicate = Delivery {
            id: id.clone(),
            queue_name: "dispatch".to_string(),
            task_type: "dispatch.campaign".to_string(),
            payload: json!({"campaignId": "c1"}),
            attempts: 2,
        };
        let err = worker.handle(duplicate).await.unwrap_err();

        assert!(err.is_already_finished());
        assert_eq!(executor.calls(), 1);
        assert_eq!(fixture.store.find(&id).await.unwrap(), finished);
    }

    #[tokio::test]
    async fn worker_only_claims_its_queue() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::new(JobKind::Crawl);
        let worker = fixture.worker(executor.clone());
        fixture.enqueue_dispatch().await;

        let handled = worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(handled, 0);
        assert_eq!(fixture.queue.counts("dispatch").await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fixture = Fixture::new();
        let worker = fixture.worker(RecordingExecutor::new(JobKind::Dispatch));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), worker.run(shutdown))
            .await
            .expect("worker should stop")
            .unwrap();
    }

    struct SlowExecutor {
        duration: Duration,
    }

    #[async_trait]
    impl JobExecutor for SlowExecutor {
        fn kind(&self) -> JobKind {
            JobKind::Dispatch
        }

        async fn execute(&self, _id: &JobId, _payload: JobPayload) -> Result<()> {
            tokio::time::sleep(self.duration).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn in_flight_job_keeps_lease_through_shutdown() {
        let queue = Arc::new(InMemoryJobQueue::with_lease(chrono::Duration::milliseconds(150)));
        let store = Arc::new(InMemoryJobStore::new());
        let producer = JobProducer::new(queue.clone(), store.clone());
        let payload = JobPayload::Dispatch(DispatchCampaignPayload {
            campaign_id: "c1".to_string(),
        });
        let id = producer.enqueue(&payload, None).await.unwrap().id;

        let worker = JobWorker::with_config(
            queue.clone(),
            store.clone(),
            Arc::new(SlowExecutor {
                duration: Duration::from_millis(500),
            }),
            JobWorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..JobWorkerConfig::with_worker_id("w1")
            }
            .with_lease(Duration::from_millis(150)),
        );
        let shutdown = CancellationToken::new();
        let running = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Past the original lease, but the job is still running
        assert!(queue.claim("dispatch", "w2", 10).await.unwrap().is_empty());

        running.await.unwrap().unwrap();
        let job = store.find(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn run_once_claims_nothing_after_shutdown() {
        let fixture = Fixture::new();
        let executor = RecordingExecutor::new(JobKind::Dispatch);
        let worker = fixture.worker(executor.clone());
        fixture.enqueue_dispatch().await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let handled = worker.run_once(&shutdown).await.unwrap();

        assert_eq!(handled, 0);
        assert_eq!(executor.calls(), 0);
        assert_eq!(fixture.queue.counts("dispatch").await.unwrap().waiting, 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = JobWorkerConfig::default();
        assert_eq!(config.batch_size, 10);
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn test_config_with_worker_id() {
        let config = JobWorkerConfig::with_worker_id("my-worker");
        assert_eq!(config.worker_id, "my-worker");
    }

    #[test]
    fn heartbeat_follows_lease() {
        let config = JobWorkerConfig::default().with_lease(Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
    }
}
