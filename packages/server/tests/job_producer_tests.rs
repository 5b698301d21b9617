//! Producer tests against Postgres: a message only becomes claimable once
//! its job row is recorded.

mod common;

use std::sync::Arc;
use std::time::Duration;

use crate::common::TestHarness;
use anyhow::Result;
use async_trait::async_trait;
use campaign_core::kernel::jobs::{
    DispatchCampaignPayload, Job, JobError, JobExecutor, JobId, JobKind, JobPayload, JobProducer,
    JobQueue, JobStatus, JobStore, JobUpdate, JobWorker, JobWorkerConfig, NewJob,
    PostgresJobStore,
};
use test_context::test_context;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Postgres store whose row writes take a while.
struct SlowRowStore {
    inner: PostgresJobStore,
    delay: Duration,
}

#[async_trait]
impl JobStore for SlowRowStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(new_job).await
    }

    async fn find(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        self.inner.find(id).await
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<Job, JobError> {
        self.inner.update(id, update).await
    }
}

struct NoopDispatch;

#[async_trait]
impl JobExecutor for NoopDispatch {
    fn kind(&self) -> JobKind {
        JobKind::Dispatch
    }

    async fn execute(&self, _id: &JobId, payload: JobPayload) -> Result<()> {
        payload.expect_kind(JobKind::Dispatch)?;
        Ok(())
    }
}

fn dispatch() -> JobPayload {
    JobPayload::Dispatch(DispatchCampaignPayload {
        campaign_id: Uuid::new_v4().to_string(),
    })
}

#[test_context(TestHarness)]
#[tokio::test]
async fn concurrent_claims_never_see_message_before_row(ctx: &TestHarness) {
    let queue = Arc::new(ctx.job_queue());
    let store = Arc::new(SlowRowStore {
        inner: ctx.job_store(),
        delay: Duration::from_millis(500),
    });
    let producer = JobProducer::new(queue.clone(), store);

    let pending = tokio::spawn(async move { producer.enqueue(&dispatch(), None).await });

    // Claim as fast as possible while the row is being written
    let claimer = tokio::spawn({
        let queue = queue.clone();
        async move {
            let mut seen = Vec::new();
            for _ in 0..10 {
                for delivery in queue.claim("dispatch", "eager-worker", 10).await.unwrap() {
                    seen.push(delivery.id);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            seen
        }
    });

    let seen = claimer.await.unwrap();
    let job = pending.await.unwrap().unwrap();

    assert!(!seen.contains(&job.id), "claimed before the row existed");
    let row = ctx.job_store().find(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Queued);

    let worker = JobWorker::with_config(
        queue.clone(),
        Arc::new(ctx.job_store()),
        Arc::new(NoopDispatch),
        JobWorkerConfig {
            batch_size: 50,
            ..JobWorkerConfig::with_worker_id("producer-test-worker")
        },
    );

    // The dispatch queue is shared with other tests; drain until this job finishes.
    let shutdown = CancellationToken::new();
    let mut finished = None;
    for _ in 0..20 {
        worker.run_once(&shutdown).await.unwrap();
        let current = ctx.job_store().find(&job.id).await.unwrap().unwrap();
        if current.status.is_terminal() {
            finished = Some(current);
            break;
        }
    }

    let finished = finished.expect("job did not finish");
    assert_eq!(finished.status, JobStatus::Completed);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn held_message_is_counted_while_row_is_written(ctx: &TestHarness) {
    let queue = Arc::new(ctx.job_queue());
    let store = Arc::new(SlowRowStore {
        inner: ctx.job_store(),
        delay: Duration::from_millis(200),
    });
    let producer = JobProducer::new(queue.clone(), store);

    let pending = tokio::spawn(async move { producer.enqueue(&dispatch(), None).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(queue.counts("dispatch").await.unwrap().held >= 1);

    let job = pending.await.unwrap().unwrap();
    let state: String =
        sqlx::query_scalar("SELECT state::text FROM queue_messages WHERE id = $1")
            .bind(job.id.as_str())
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert!(state == "waiting" || state == "active" || state == "completed");
}
