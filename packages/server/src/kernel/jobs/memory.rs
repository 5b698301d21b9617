//! In-memory store and queue.
//!
//! Same contracts as the Postgres implementations, held behind a mutex.
//! Used by unit tests and for running the API without a database-backed
//! worker.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::error::JobError;
use super::job::{Job, JobId, JobStatus, JobUpdate, NewJob};
use super::job_store::JobStore;
use super::queue::{Delivery, EnqueueOptions, JobQueue, MessageState, QueueCounts};

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError> {
        let job = new_job.into_job(Utc::now())?;
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(JobError::AlreadyExists(job.id));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn find(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<Job, JobError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;
        update.apply(job, Utc::now());
        Ok(job.clone())
    }

    /// Check and write under one lock acquisition.
    async fn transition(
        &self,
        id: &JobId,
        to: JobStatus,
        error_text: Option<&str>,
    ) -> Result<Job, JobError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;
        let now = Utc::now();
        job.plan_transition(to, now, error_text)?.apply(job, now);
        Ok(job.clone())
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone)]
struct Message {
    id: JobId,
    queue_name: String,
    task_type: String,
    payload: serde_json::Value,
    options: EnqueueOptions,
    state: MessageState,
    attempts: i32,
    worker_id: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    failed_reason: Option<String>,
    purge_after: Option<DateTime<Utc>>,
}

impl Message {
    fn is_claimable(&self, queue_name: &str, now: DateTime<Utc>) -> bool {
        if self.queue_name != queue_name {
            return false;
        }
        match self.state {
            MessageState::Waiting => true,
            MessageState::Active => self.lease_expires_at.is_some_and(|at| at < now),
            MessageState::Held | MessageState::Completed | MessageState::Failed => false,
        }
    }

    fn is_leased_to(&self, worker_id: &str) -> bool {
        self.state == MessageState::Active && self.worker_id.as_deref() == Some(worker_id)
    }
}

/// Messages are kept in enqueue order so claims are FIFO per queue.
pub struct InMemoryJobQueue {
    messages: Mutex<Vec<Message>>,
    lease: Duration,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::with_lease(Duration::minutes(1))
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(lease: Duration) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            lease,
        }
    }

    /// Number of messages still held, in any state.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Reason recorded by `fail`, if the message is still retained.
    pub async fn failed_reason(&self, id: &JobId) -> Option<String> {
        self.messages
            .lock()
            .await
            .iter()
            .find(|m| &m.id == id)
            .and_then(|m| m.failed_reason.clone())
    }

    async fn push(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
        state: MessageState,
    ) -> JobId {
        let id = JobId::generate();
        self.messages.lock().await.push(Message {
            id: id.clone(),
            queue_name: queue_name.to_string(),
            task_type: task_type.to_string(),
            payload,
            options,
            state,
            attempts: 0,
            worker_id: None,
            lease_expires_at: None,
            failed_reason: None,
            purge_after: None,
        });
        id
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        Ok(self
            .push(queue_name, task_type, payload, options, MessageState::Waiting)
            .await)
    }

    async fn enqueue_held(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        Ok(self
            .push(queue_name, task_type, payload, options, MessageState::Held)
            .await)
    }

    async fn release(&self, id: &JobId) -> Result<()> {
        let mut messages = self.messages.lock().await;
        match messages
            .iter_mut()
            .find(|m| &m.id == id && m.state == MessageState::Held)
        {
            Some(message) => {
                message.state = MessageState::Waiting;
                Ok(())
            }
            None => bail!("job {id} is not held"),
        }
    }

    async fn discard(&self, id: &JobId) -> Result<()> {
        self.messages
            .lock()
            .await
            .retain(|m| !(&m.id == id && m.state == MessageState::Held));
        Ok(())
    }

    async fn claim(&self, queue_name: &str, worker_id: &str, limit: i64) -> Result<Vec<Delivery>> {
        let now = Utc::now();
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut messages = self.messages.lock().await;

        let claimed = messages
            .iter_mut()
            .filter(|m| m.is_claimable(queue_name, now))
            .take(limit)
            .map(|m| {
                m.state = MessageState::Active;
                m.attempts += 1;
                m.worker_id = Some(worker_id.to_string());
                m.lease_expires_at = Some(now + self.lease);
                Delivery {
                    id: m.id.clone(),
                    queue_name: m.queue_name.clone(),
                    task_type: m.task_type.clone(),
                    payload: m.payload.clone(),
                    attempts: m.attempts,
                }
            })
            .collect();

        Ok(claimed)
    }

    async fn ack(&self, id: &JobId, worker_id: &str) -> Result<()> {
        let mut messages = self.messages.lock().await;
        let Some(pos) = messages
            .iter()
            .position(|m| &m.id == id && m.is_leased_to(worker_id))
        else {
            bail!("job {id} is not leased to {worker_id}");
        };

        if messages[pos].options.remove_on_complete {
            messages.remove(pos);
        } else {
            let message = &mut messages[pos];
            message.state = MessageState::Completed;
            message.worker_id = None;
            message.lease_expires_at = None;
        }
        Ok(())
    }

    async fn fail(&self, id: &JobId, worker_id: &str, reason: &str) -> Result<()> {
        let now = Utc::now();
        let mut messages = self.messages.lock().await;
        let Some(message) = messages
            .iter_mut()
            .find(|m| &m.id == id && m.is_leased_to(worker_id))
        else {
            bail!("job {id} is not leased to {worker_id}");
        };

        message.state = MessageState::Failed;
        message.failed_reason = Some(reason.to_string());
        message.purge_after = message.options.remove_on_fail_after.map(|ttl| now + ttl);
        message.worker_id = None;
        message.lease_expires_at = None;
        Ok(())
    }

    async fn heartbeat(&self, id: &JobId, worker_id: &str) -> Result<()> {
        let now = Utc::now();
        let mut messages = self.messages.lock().await;
        let Some(message) = messages
            .iter_mut()
            .find(|m| &m.id == id && m.is_leased_to(worker_id))
        else {
            bail!("job {id} is no longer leased to {worker_id}");
        };

        message.lease_expires_at = Some(now + self.lease);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut messages = self.messages.lock().await;
        let before = messages.len();
        messages.retain(|m| {
            !(m.state == MessageState::Failed && m.purge_after.is_some_and(|at| at <= now))
        });
        Ok((before - messages.len()) as u64)
    }

    async fn counts(&self, queue_name: &str) -> Result<QueueCounts> {
        let mut counts = QueueCounts::default();
        for message in self.messages.lock().await.iter() {
            if message.queue_name == queue_name {
                counts.add(message.state, 1);
            }
        }
        Ok(counts)
    }
}
