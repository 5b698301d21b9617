use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::domains::campaigns::data::dispatch_payload;
use crate::domains::campaigns::{
    Campaign, CreateCampaignRequest, DiscoverRequest, EnqueuedJob, Lead, LeadsQuery,
    QualifyRequest,
};
use crate::kernel::jobs::JobPayload;
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// Parse a JSON request body. An empty body reads as `{}`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| ApiError::Validation {
        message: "invalid request body".to_string(),
        details: Some(json!(e.to_string())),
    })
}

pub(crate) fn parse_campaign_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation(format!("invalid campaign id {raw:?}")))
}

async fn require_campaign(id: Uuid, state: &AppState) -> Result<Campaign, ApiError> {
    Campaign::find_by_id(id, &state.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("campaign {id} not found")))
}

async fn enqueue_for_campaign(
    id: Uuid,
    payload: JobPayload,
    state: &AppState,
) -> Result<Json<EnqueuedJob>, ApiError> {
    // Checked before touching the queue so an unknown campaign leaves nothing behind.
    payload.validate()?;
    require_campaign(id, state).await?;

    let job = state
        .server_deps
        .job_producer()
        .enqueue(&payload, Some(id))
        .await?;

    Ok(Json(EnqueuedJob { job_id: job.id }))
}

/// POST /campaigns
pub async fn create_campaign_handler(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Json<Campaign>, ApiError> {
    let request: CreateCampaignRequest = parse_body(&body)?;
    request.validate().map_err(ApiError::validation)?;

    let campaign = Campaign::create(&request.name, request.criteria, &state.db_pool).await?;
    tracing::info!(campaign_id = %campaign.id, criteria_hash = %campaign.criteria_hash, "campaign created");

    Ok(Json(campaign))
}

/// POST /campaigns/:id/discover
pub async fn discover_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<EnqueuedJob>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let request: DiscoverRequest = parse_body(&body)?;

    enqueue_for_campaign(id, request.into_payload(id), &state).await
}

/// POST /campaigns/:id/qualify
pub async fn qualify_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<EnqueuedJob>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let request: QualifyRequest = parse_body(&body)?;

    enqueue_for_campaign(id, request.into_payload(id), &state).await
}

/// POST /campaigns/:id/dispatch
pub async fn dispatch_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EnqueuedJob>, ApiError> {
    let id = parse_campaign_id(&id)?;

    enqueue_for_campaign(id, dispatch_payload(id), &state).await
}

/// GET /campaigns/:id/leads?limit=N
pub async fn leads_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LeadsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_campaign_id(&id)?;
    let limit = query.limit().map_err(ApiError::validation)?;

    let items = Lead::list_by_campaign(id, limit, &state.db_pool).await?;

    Ok(Json(json!({ "items": items })))
}
