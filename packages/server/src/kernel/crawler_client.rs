use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

use super::traits::{BaseCrawlerClient, CrawlRequest};

const CRAWL_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the crawler service.
pub struct HttpCrawlerClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCrawlerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CRAWL_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn crawl_jobs_url(&self) -> String {
        format!("{}/crawl/jobs", self.base_url)
    }
}

#[async_trait]
impl BaseCrawlerClient for HttpCrawlerClient {
    async fn submit_crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.crawl_jobs_url())
            .json(request)
            .send()
            .await
            .context("Failed to send crawl request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read crawler response")?;
        let json = parse_body(&body);

        if !status.is_success() {
            anyhow::bail!("{}", http_error_message(status, &json));
        }

        Ok(json)
    }
}

/// Empty body is `Null`; a body that is not JSON is kept as a string.
fn parse_body(body: &str) -> serde_json::Value {
    if body.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
}

/// `HTTP <status> <message>`, preferring the body's `message` field over
/// the status reason.
fn http_error_message(status: StatusCode, body: &serde_json::Value) -> String {
    let message = match body.get("message") {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => status.canonical_reason().unwrap_or_default().to_string(),
    };
    format!("HTTP {} {}", status.as_u16(), message)
}
