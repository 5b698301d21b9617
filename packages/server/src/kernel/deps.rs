//! Server dependencies (using traits for testability)
//!
//! Store, queue, and external clients are constructed once at process start
//! and passed explicitly to the HTTP layer and the workers.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use crate::config::Config;
use crate::kernel::jobs::{
    JobProducer, JobQueue, JobStore, PostgresJobQueue, PostgresJobStore,
};
use crate::kernel::{BaseCrawlerClient, HttpCrawlerClient};

#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub job_store: Arc<dyn JobStore>,
    pub job_queue: Arc<dyn JobQueue>,
    pub crawler: Arc<dyn BaseCrawlerClient>,
}

impl ServerDeps {
    pub fn new(
        db_pool: PgPool,
        job_store: Arc<dyn JobStore>,
        job_queue: Arc<dyn JobQueue>,
        crawler: Arc<dyn BaseCrawlerClient>,
    ) -> Self {
        Self {
            db_pool,
            job_store,
            job_queue,
            crawler,
        }
    }

    /// Postgres-backed store and queue plus the HTTP crawler client.
    pub fn from_config(db_pool: PgPool, config: &Config) -> Result<Self> {
        let job_store = Arc::new(PostgresJobStore::new(db_pool.clone()));
        let job_queue = Arc::new(PostgresJobQueue::with_lease_duration(
            db_pool.clone(),
            config.job_lease_ms,
        ));
        let crawler = Arc::new(HttpCrawlerClient::new(&config.crawler_base_url)?);

        Ok(Self::new(db_pool, job_store, job_queue, crawler))
    }

    pub fn job_producer(&self) -> JobProducer {
        JobProducer::new(self.job_queue.clone(), self.job_store.clone())
    }
}
