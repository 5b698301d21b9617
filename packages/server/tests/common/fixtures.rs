//! Test fixtures for creating test data.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use campaign_core::common::Value;
use campaign_core::domains::campaigns::Campaign;
use campaign_core::kernel::{BaseCrawlerClient, CrawlRequest};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tower::ServiceExt;

/// Crawler that records every request instead of calling a service.
#[derive(Default)]
pub struct FakeCrawler {
    pub requests: Mutex<Vec<CrawlRequest>>,
    pub fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl BaseCrawlerClient for FakeCrawler {
    async fn submit_crawl(&self, request: &CrawlRequest) -> Result<serde_json::Value> {
        self.requests.lock().await.push(request.clone());
        if let Some(message) = self.fail_with.lock().await.clone() {
            bail!(message);
        }
        Ok(serde_json::json!({ "accepted": true }))
    }
}

pub fn test_criteria() -> Value {
    let mut criteria = BTreeMap::new();
    criteria.insert("niche".to_string(), Value::String("fitness".to_string()));
    criteria.insert("minFollowers".to_string(), Value::Number(1000.0));
    Value::Map(criteria)
}

pub async fn create_test_campaign(pool: &PgPool, name: &str) -> Result<Campaign> {
    Campaign::create(name, test_criteria(), pool).await
}

/// Send a request through the router and decode the JSON response.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}
