use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// A scored profile collected for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub username: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Top `limit` leads of a campaign, highest score first.
    pub async fn list_by_campaign(campaign_id: Uuid, limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE campaign_id = $1
            ORDER BY score DESC, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn create(
        campaign_id: Uuid,
        username: &str,
        score: f64,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (id, campaign_id, username, score)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(campaign_id)
        .bind(username)
        .bind(score)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
