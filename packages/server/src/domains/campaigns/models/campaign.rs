use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::utils::criteria_hash;
use crate::common::Value;

/// A campaign: a named set of targeting criteria that jobs run against.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub criteria: Json<Value>,
    pub criteria_hash: String, // sha256 of the canonical criteria
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Insert a campaign, hashing its criteria.
    pub async fn create(name: &str, criteria: Value, pool: &PgPool) -> Result<Self> {
        let hash = criteria_hash(&criteria);

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (id, name, criteria, criteria_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(Json(criteria))
        .bind(hash)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }
}
