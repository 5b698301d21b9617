//! Job-type logic for the three campaign queues.
//!
//! Each executor receives an already-validated payload. Status bookkeeping
//! is handled by the worker around them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::kernel::jobs::{JobExecutor, JobId, JobKind, JobPayload, PayloadError};
use crate::kernel::{BaseCrawlerClient, CrawlRequest};

fn wrong_kind(expected: JobKind, payload: &JobPayload) -> anyhow::Error {
    PayloadError::WrongKind {
        expected,
        actual: payload.kind(),
    }
    .into()
}

/// `crawl.seed`: hands the seed to the crawler service.
pub struct CrawlExecutor {
    crawler: Arc<dyn BaseCrawlerClient>,
}

impl CrawlExecutor {
    pub fn new(crawler: Arc<dyn BaseCrawlerClient>) -> Self {
        Self { crawler }
    }
}

#[async_trait]
impl JobExecutor for CrawlExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Crawl
    }

    async fn execute(&self, id: &JobId, payload: JobPayload) -> Result<()> {
        let input = match payload {
            JobPayload::Crawl(input) => input,
            other => return Err(wrong_kind(JobKind::Crawl, &other)),
        };

        info!(
            job_id = %id,
            campaign_id = %input.campaign_id,
            seed_type = ?input.seed_type,
            seed_value = %input.seed_value,
            max_profiles = input.crawl_config.max_profiles,
            "submitting crawl"
        );

        let request = CrawlRequest {
            seed_type: input.seed_type,
            seed_value: input.seed_value,
            crawl_config: input.crawl_config,
        };
        let response = self.crawler.submit_crawl(&request).await?;

        info!(job_id = %id, response = %response, "crawl submitted");
        Ok(())
    }
}

/// `qualify.campaign`: no scoring logic yet; logs its input and succeeds.
#[derive(Default)]
pub struct QualifyExecutor;

#[async_trait]
impl JobExecutor for QualifyExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Qualify
    }

    async fn execute(&self, id: &JobId, payload: JobPayload) -> Result<()> {
        let input = match payload {
            JobPayload::Qualify(input) => input,
            other => return Err(wrong_kind(JobKind::Qualify, &other)),
        };

        info!(
            job_id = %id,
            campaign_id = %input.campaign_id,
            use_llm = input.use_llm,
            batch_size = input.batch_size,
            "qualify job"
        );
        Ok(())
    }
}

/// `dispatch.campaign`: no sending logic yet; logs its input and succeeds.
#[derive(Default)]
pub struct DispatchExecutor;

#[async_trait]
impl JobExecutor for DispatchExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Dispatch
    }

    async fn execute(&self, id: &JobId, payload: JobPayload) -> Result<()> {
        let input = match payload {
            JobPayload::Dispatch(input) => input,
            other => return Err(wrong_kind(JobKind::Dispatch, &other)),
        };

        info!(job_id = %id, campaign_id = %input.campaign_id, "dispatch job");
        Ok(())
    }
}

/// One executor per job kind.
pub fn campaign_executors(crawler: Arc<dyn BaseCrawlerClient>) -> Vec<Arc<dyn JobExecutor>> {
    let crawl: Arc<dyn JobExecutor> = Arc::new(CrawlExecutor::new(crawler));
    let qualify: Arc<dyn JobExecutor> = Arc::new(QualifyExecutor);
    let dispatch: Arc<dyn JobExecutor> = Arc::new(DispatchExecutor);
    vec![crawl, qualify, dispatch]
}
