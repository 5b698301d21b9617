//! Job kinds and their typed payloads.
//!
//! Each kind owns one queue, one task type tag, and one payload schema.
//! Payloads travel through the queue as JSON and are parsed back into a
//! [`JobPayload`] variant before the matching executor sees them.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("invalid {kind} payload: {message}")]
    Malformed { kind: JobKind, message: String },

    #[error("invalid {kind} payload: {field} {reason}")]
    Invalid {
        kind: JobKind,
        field: &'static str,
        reason: String,
    },

    #[error("payload is for {actual}, expected {expected}")]
    WrongKind { expected: JobKind, actual: JobKind },
}

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Crawl,
    Qualify,
    Dispatch,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Crawl, JobKind::Qualify, JobKind::Dispatch];

    /// Name of the queue this kind is delivered on.
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::Crawl => "crawl",
            JobKind::Qualify => "qualify",
            JobKind::Dispatch => "dispatch",
        }
    }

    /// Task type tag stored on the queue message and the job row.
    pub fn task_type(&self) -> &'static str {
        match self {
            JobKind::Crawl => "crawl.seed",
            JobKind::Qualify => "qualify.campaign",
            JobKind::Dispatch => "dispatch.campaign",
        }
    }

    /// Error text recorded when a failure carries no message of its own.
    pub fn fallback_error(&self) -> &'static str {
        match self {
            JobKind::Crawl => "crawl_failed",
            JobKind::Qualify => "qualify_failed",
            JobKind::Dispatch => "dispatch_failed",
        }
    }

    pub fn from_task_type(task_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.task_type() == task_type)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.task_type())
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedType {
    #[default]
    Post,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_max_profiles")]
    pub max_profiles: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_profiles: default_max_profiles(),
        }
    }
}

fn default_max_profiles() -> u32 {
    500
}

fn default_use_llm() -> bool {
    true
}

fn default_batch_size() -> u32 {
    200
}

/// `crawl.seed`: crawl outward from a seed post or profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSeedPayload {
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
    pub seed_type: SeedType,
    pub seed_value: String,
    #[serde(default)]
    pub crawl_config: CrawlConfig,
}

/// `qualify.campaign`: score collected profiles for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyCampaignPayload {
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

/// `dispatch.campaign`: send the top leads of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCampaignPayload {
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
}

/// A validated payload, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    Crawl(CrawlSeedPayload),
    Qualify(QualifyCampaignPayload),
    Dispatch(DispatchCampaignPayload),
}

impl JobPayload {
    /// Parse and validate a raw queue payload as the given kind.
    pub fn parse(kind: JobKind, raw: &serde_json::Value) -> Result<Self, PayloadError> {
        let payload = match kind {
            JobKind::Crawl => JobPayload::Crawl(decode(kind, raw)?),
            JobKind::Qualify => JobPayload::Qualify(decode(kind, raw)?),
            JobKind::Dispatch => JobPayload::Dispatch(decode(kind, raw)?),
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Crawl(_) => JobKind::Crawl,
            JobPayload::Qualify(_) => JobKind::Qualify,
            JobPayload::Dispatch(_) => JobKind::Dispatch,
        }
    }

    pub fn campaign_id(&self) -> &str {
        match self {
            JobPayload::Crawl(p) => &p.campaign_id,
            JobPayload::Qualify(p) => &p.campaign_id,
            JobPayload::Dispatch(p) => &p.campaign_id,
        }
    }

    /// Field-level constraints shared by producers and workers.
    pub fn validate(&self) -> Result<(), PayloadError> {
        let kind = self.kind();
        let invalid = |field: &'static str, reason: &str| PayloadError::Invalid {
            kind,
            field,
            reason: reason.to_string(),
        };

        if self.campaign_id().trim().is_empty() {
            return Err(invalid("campaignId", "must not be empty"));
        }

        match self {
            JobPayload::Crawl(p) => {
                if p.seed_value.is_empty() {
                    return Err(invalid("seed_value", "must not be empty"));
                }
                if !(1..=5000).contains(&p.crawl_config.max_profiles) {
                    return Err(invalid(
                        "crawl_config.max_profiles",
                        "must be between 1 and 5000",
                    ));
                }
            }
            JobPayload::Qualify(p) => {
                if !(1..=2000).contains(&p.batch_size) {
                    return Err(invalid("batch_size", "must be between 1 and 2000"));
                }
            }
            JobPayload::Dispatch(_) => {}
        }

        Ok(())
    }

    /// JSON form carried on the queue message.
    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            JobPayload::Crawl(p) => serde_json::to_value(p),
            JobPayload::Qualify(p) => serde_json::to_value(p),
            JobPayload::Dispatch(p) => serde_json::to_value(p),
        };
        // Plain structs of strings, bools and integers always serialize
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Ensure this payload is the kind an executor was bound to.
    pub fn expect_kind(self, expected: JobKind) -> Result<Self, PayloadError> {
        let actual = self.kind();
        if actual != expected {
            return Err(PayloadError::WrongKind { expected, actual });
        }
        Ok(self)
    }
}

fn decode<T: DeserializeOwned>(kind: JobKind, raw: &serde_json::Value) -> Result<T, PayloadError> {
    T::deserialize(raw).map_err(|e| PayloadError::Malformed {
        kind,
        message: e.to_string(),
    })
}
