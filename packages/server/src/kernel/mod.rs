//! Kernel module - server infrastructure and dependencies.

pub mod crawler_client;
pub mod deps;
pub mod jobs;
pub mod traits;

pub use crawler_client::HttpCrawlerClient;
pub use deps::ServerDeps;
pub use traits::*;
