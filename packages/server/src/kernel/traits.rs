// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Naming convention: Base* for trait names (e.g., BaseCrawlerClient)

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::kernel::jobs::{CrawlConfig, SeedType};

// =============================================================================
// Crawler Service Trait
// =============================================================================

/// Body posted to the crawler service to start a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlRequest {
    pub seed_type: SeedType,
    pub seed_value: String,
    pub crawl_config: CrawlConfig,
}

#[async_trait]
pub trait BaseCrawlerClient: Send + Sync {
    /// Submit a crawl job. Returns the service's JSON response (or `Null`
    /// for an empty body).
    async fn submit_crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value>;
}
