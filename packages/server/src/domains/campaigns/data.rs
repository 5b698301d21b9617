//! Request and response bodies for the campaigns API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::Value;
use crate::kernel::jobs::{
    CrawlConfig, CrawlSeedPayload, DispatchCampaignPayload, JobId, JobPayload,
    QualifyCampaignPayload, SeedType,
};

const DEFAULT_LEADS_LIMIT: i64 = 50;
const MAX_LEADS_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub criteria: Value,
}

impl CreateCampaignRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.criteria == Value::Null {
            return Err("criteria must not be null".to_string());
        }
        Ok(())
    }
}

/// Body of `POST /campaigns/:id/discover`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverRequest {
    #[serde(default)]
    pub seed_type: SeedType,
    pub seed_value: String,
    #[serde(default)]
    pub crawl_config: CrawlConfig,
}

impl DiscoverRequest {
    pub fn into_payload(self, campaign_id: Uuid) -> JobPayload {
        JobPayload::Crawl(CrawlSeedPayload {
            campaign_id: campaign_id.to_string(),
            seed_type: self.seed_type,
            seed_value: self.seed_value,
            crawl_config: self.crawl_config,
        })
    }
}

/// Body of `POST /campaigns/:id/qualify`. The whole body is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct QualifyRequest {
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for QualifyRequest {
    fn default() -> Self {
        Self {
            use_llm: default_use_llm(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_use_llm() -> bool {
    true
}

fn default_batch_size() -> u32 {
    200
}

impl QualifyRequest {
    pub fn into_payload(self, campaign_id: Uuid) -> JobPayload {
        JobPayload::Qualify(QualifyCampaignPayload {
            campaign_id: campaign_id.to_string(),
            use_llm: self.use_llm,
            batch_size: self.batch_size,
        })
    }
}

pub fn dispatch_payload(campaign_id: Uuid) -> JobPayload {
    JobPayload::Dispatch(DispatchCampaignPayload {
        campaign_id: campaign_id.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnqueuedJob {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadsQuery {
    pub limit: Option<String>,
}

impl LeadsQuery {
    /// `limit` as an integer in `1..=1000`, default 50.
    pub fn limit(&self) -> Result<i64, String> {
        let Some(raw) = self.limit.as_deref() else {
            return Ok(DEFAULT_LEADS_LIMIT);
        };
        let limit: i64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("limit must be an integer, got {raw:?}"))?;
        if !(1..=MAX_LEADS_LIMIT).contains(&limit) {
            return Err(format!("limit must be between 1 and {MAX_LEADS_LIMIT}"));
        }
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discover_defaults_seed_type_and_config() {
        let request: DiscoverRequest =
            serde_json::from_value(json!({"seed_value": "https://example.com/p/1"})).unwrap();

        assert_eq!(request.seed_type, SeedType::Post);
        assert_eq!(request.crawl_config.max_profiles, 500);
    }

    #[test]
    fn discover_payload_carries_campaign_id() {
        let id = Uuid::new_v4();
        let request: DiscoverRequest =
            serde_json::from_value(json!({"seed_type": "profile", "seed_value": "@acme"})).unwrap();

        let payload = request.into_payload(id);

        assert_eq!(payload.campaign_id(), id.to_string());
        assert_eq!(payload.to_json()["seed_type"], "profile");
    }

    #[test]
    fn qualify_defaults() {
        let request: QualifyRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.use_llm);
        assert_eq!(request.batch_size, 200);
    }

    #[test]
    fn leads_limit_bounds() {
        let query = |limit: Option<&str>| LeadsQuery {
            limit: limit.map(str::to_string),
        };

        assert_eq!(query(None).limit(), Ok(50));
        assert_eq!(query(Some("1000")).limit(), Ok(1000));
        assert!(query(Some("0")).limit().is_err());
        assert!(query(Some("1001")).limit().is_err());
        assert!(query(Some("ten")).limit().is_err());
    }

    #[test]
    fn create_campaign_requires_name() {
        let request = CreateCampaignRequest {
            name: String::new(),
            criteria: Value::from("x"),
        };
        assert!(request.validate().is_err());
    }
}
