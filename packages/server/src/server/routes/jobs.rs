use axum::{
    extract::{Extension, Path},
    Json,
};
use serde_json::json;

use crate::kernel::jobs::JobId;
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// GET /jobs/:id
///
/// Returns the job row, or `{}` when no job has that id.
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .server_deps
        .job_store
        .find(&JobId::from(id))
        .await?;

    let body = match job {
        Some(job) => serde_json::to_value(job).map_err(anyhow::Error::from)?,
        None => json!({}),
    };
    Ok(Json(body))
}
