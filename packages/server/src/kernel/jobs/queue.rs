//! Named, durable work queues.
//!
//! The queue is the delivery layer: it assigns job ids, hands each message to
//! one worker at a time under a lease, and applies retention policies once a
//! message finishes. It never touches the job record store.
//!
//! Delivery policy:
//! - A message is exclusive to one worker while its lease is live.
//! - If a worker dies, the lease expires and the message is claimable again
//!   (at-least-once).
//! - A message whose handler failed is parked in `failed` and is NOT
//!   redelivered; it is kept for diagnostics until `remove_on_fail_after`
//!   elapses and the reaper purges it.
//! - Only the worker holding the lease may ack, fail, or heartbeat a
//!   message. A worker whose lease was taken over gets an error.
//! - A message enqueued with [`JobQueue::enqueue_held`] is invisible to
//!   `claim` until [`JobQueue::release`] is called.

use async_trait::async_trait;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use super::job::JobId;

/// Retention applied to a message once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Delete the message as soon as its handler succeeds.
    pub remove_on_complete: bool,
    /// Keep failed messages this long before the reaper purges them.
    /// `None` keeps them forever.
    pub remove_on_fail_after: Option<Duration>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            remove_on_complete: true,
            remove_on_fail_after: Some(Duration::hours(24)),
        }
    }
}

/// A message handed to a worker.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Delivery {
    pub id: JobId,
    pub queue_name: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    /// 1 on first delivery, higher after lease-expiry redelivery.
    pub attempts: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_message_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Held,
    Waiting,
    Active,
    Completed,
    Failed,
}

/// Per-state message counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub held: i64,
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueCounts {
    pub(crate) fn add(&mut self, state: MessageState, n: i64) {
        match state {
            MessageState::Held => self.held += n,
            MessageState::Waiting => self.waiting += n,
            MessageState::Active => self.active += n,
            MessageState::Completed => self.completed += n,
            MessageState::Failed => self.failed += n,
        }
    }
}

/// Trait for queue operations.
///
/// `consume(queue, handler)` is realised by [`super::JobWorker`], which
/// drives `claim` / `ack` / `fail` / `heartbeat` in a polling loop.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a payload and return the id assigned to it.
    async fn enqueue(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId>;

    /// Enqueue a payload that `claim` cannot see until it is released.
    async fn enqueue_held(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId>;

    /// Make a held message claimable.
    async fn release(&self, id: &JobId) -> Result<()>;

    /// Drop a held message that will never be released.
    async fn discard(&self, id: &JobId) -> Result<()>;

    /// Claim up to `limit` deliverable messages for `worker_id`.
    async fn claim(&self, queue_name: &str, worker_id: &str, limit: i64) -> Result<Vec<Delivery>>;

    /// Acknowledge a successfully handled message.
    async fn ack(&self, id: &JobId, worker_id: &str) -> Result<()>;

    /// Record a handler failure. The message is not redelivered.
    async fn fail(&self, id: &JobId, worker_id: &str, reason: &str) -> Result<()>;

    /// Extend the lease of an active message.
    async fn heartbeat(&self, id: &JobId, worker_id: &str) -> Result<()>;

    /// Delete failed messages whose retention window ended at or before
    /// `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn counts(&self, queue_name: &str) -> Result<QueueCounts>;
}

/// PostgreSQL-backed queue.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    lease_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_ms: 60_000, // 1 minute
        }
    }

    /// Create with a custom lease duration.
    pub fn with_lease_duration(pool: PgPool, lease_ms: i64) -> Self {
        Self { pool, lease_ms }
    }

    pub fn lease_ms(&self) -> i64 {
        self.lease_ms
    }
}

impl PostgresJobQueue {
    async fn insert_message(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
        state: MessageState,
    ) -> Result<JobId> {
        let id = JobId::generate();

        sqlx::query(
            r#"
            INSERT INTO queue_messages (
                id, queue_name, task_type, payload, state, remove_on_complete, remove_on_fail_after_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&id)
        .bind(queue_name)
        .bind(task_type)
        .bind(&payload)
        .bind(state)
        .bind(options.remove_on_complete)
        .bind(options.remove_on_fail_after.map(|d| d.num_milliseconds()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to enqueue {task_type} on {queue_name}"))?;

        debug!(job_id = %id, queue = %queue_name, task_type = %task_type, state = ?state, "enqueued message");
        Ok(id)
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.insert_message(queue_name, task_type, payload, options, MessageState::Waiting)
            .await
    }

    async fn enqueue_held(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.insert_message(queue_name, task_type, payload, options, MessageState::Held)
            .await
    }

    async fn release(&self, id: &JobId) -> Result<()> {
        let released = sqlx::query(
            "UPDATE queue_messages SET state = 'waiting' WHERE id = $1 AND state = 'held'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if released.rows_affected() == 0 {
            bail!("job {id} is not held");
        }
        Ok(())
    }

    async fn discard(&self, id: &JobId) -> Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1 AND state = 'held'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Claim messages atomically using FOR UPDATE SKIP LOCKED.
    /// Also reclaims active messages whose lease expired.
    async fn claim(&self, queue_name: &str, worker_id: &str, limit: i64) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r#"
            WITH next_messages AS (
                SELECT id
                FROM queue_messages
                WHERE queue_name = $1
                  AND (state = 'waiting' OR (state = 'active' AND lease_expires_at < NOW()))
                ORDER BY created_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queue_messages
            SET state = 'active',
                attempts = attempts + 1,
                worker_id = $3,
                lease_expires_at = NOW() + ($4 || ' milliseconds')::INTERVAL
            WHERE id IN (SELECT id FROM next_messages)
            RETURNING id, queue_name, task_type, payload, attempts
            "#,
        )
        .bind(queue_name)
        .bind(limit)
        .bind(worker_id)
        .bind(self.lease_ms.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to claim from {queue_name}"))?;

        Ok(deliveries)
    }

    async fn ack(&self, id: &JobId, worker_id: &str) -> Result<()> {
        let removed = sqlx::query(
            r#"
            DELETE FROM queue_messages
            WHERE id = $1 AND worker_id = $2 AND state = 'active' AND remove_on_complete
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if removed.rows_affected() > 0 {
            return Ok(());
        }

        let completed = sqlx::query(
            r#"
            UPDATE queue_messages
            SET state = 'completed',
                finished_at = NOW(),
                worker_id = NULL,
                lease_expires_at = NULL
            WHERE id = $1 AND worker_id = $2 AND state = 'active'
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if completed.rows_affected() == 0 {
            bail!("job {id} is not leased to {worker_id}");
        }
        Ok(())
    }

    async fn fail(&self, id: &JobId, worker_id: &str, reason: &str) -> Result<()> {
        let failed = sqlx::query(
            r#"
            UPDATE queue_messages
            SET state = 'failed',
                failed_reason = $2,
                finished_at = NOW(),
                purge_after = CASE
                    WHEN remove_on_fail_after_ms IS NULL THEN NULL
                    ELSE NOW() + (remove_on_fail_after_ms || ' milliseconds')::INTERVAL
                END,
                worker_id = NULL,
                lease_expires_at = NULL
            WHERE id = $1 AND worker_id = $3 AND state = 'active'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if failed.rows_affected() == 0 {
            bail!("job {id} is not leased to {worker_id}");
        }
        Ok(())
    }

    async fn heartbeat(&self, id: &JobId, worker_id: &str) -> Result<()> {
        let extended = sqlx::query(
            r#"
            UPDATE queue_messages
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL
            WHERE id = $2 AND worker_id = $3 AND state = 'active'
            "#,
        )
        .bind(self.lease_ms.to_string())
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if extended.rows_affected() == 0 {
            bail!("job {id} is no longer leased to {worker_id}");
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_messages
            WHERE state = 'failed'
              AND purge_after IS NOT NULL
              AND purge_after <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(count = result.rows_affected(), "purged expired failed messages");
        }
        Ok(result.rows_affected())
    }

    async fn counts(&self, queue_name: &str) -> Result<QueueCounts> {
        let rows = sqlx::query_as::<_, (MessageState, i64)>(
            r#"
            SELECT state, COUNT(*)
            FROM queue_messages
            WHERE queue_name = $1
            GROUP BY state
            "#,
        )
        .bind(queue_name)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = QueueCounts::default();
        for (state, n) in rows {
            counts.add(state, n);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retention() {
        let options = EnqueueOptions::default();
        assert!(options.remove_on_complete);
        assert_eq!(options.remove_on_fail_after, Some(Duration::hours(24)));
    }

    #[test]
    fn test_counts_accumulate_by_state() {
        let mut counts = QueueCounts::default();
        counts.add(MessageState::Waiting, 2);
        counts.add(MessageState::Failed, 1);
        counts.add(MessageState::Waiting, 1);

        assert_eq!(
            counts,
            QueueCounts {
                held: 0,
                waiting: 3,
                active: 0,
                completed: 0,
                failed: 1,
            }
        );
    }
}
