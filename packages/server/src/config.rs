use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub crawler_base_url: String,
    pub worker_batch_size: i64,
    pub worker_poll_interval: Duration,
    pub job_lease_ms: i64,
    pub reaper_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            crawler_base_url: env::var("CRAWLER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            worker_batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("WORKER_BATCH_SIZE must be a valid number")?,
            worker_poll_interval: Duration::from_millis(
                env::var("WORKER_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("WORKER_POLL_INTERVAL_MS must be a valid number")?,
            ),
            job_lease_ms: env::var("JOB_LEASE_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .context("JOB_LEASE_MS must be a valid number")?,
            reaper_interval: Duration::from_secs(
                env::var("REAPER_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("REAPER_INTERVAL_SECS must be a valid number")?,
            ),
        })
    }
}
