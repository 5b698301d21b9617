pub mod data;
pub mod executors;
pub mod models;

// Re-export commonly used types
pub use data::{CreateCampaignRequest, DiscoverRequest, EnqueuedJob, LeadsQuery, QualifyRequest};
pub use executors::{campaign_executors, CrawlExecutor, DispatchExecutor, QualifyExecutor};
pub use models::{Campaign, Lead};
