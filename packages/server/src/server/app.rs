//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::routes::{
    create_campaign_handler, discover_handler, dispatch_handler, get_job_handler,
    health_handler, leads_handler, qualify_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub server_deps: Arc<ServerDeps>,
}

impl AppState {
    pub fn new(server_deps: ServerDeps) -> Self {
        Self {
            db_pool: server_deps.db_pool.clone(),
            server_deps: Arc::new(server_deps),
        }
    }
}

/// Build the Axum application router
pub fn build_app(server_deps: ServerDeps) -> Router {
    let app_state = AppState::new(server_deps);

    // CORS configuration - allow any origin for development
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/campaigns", post(create_campaign_handler))
        .route("/campaigns/:id/discover", post(discover_handler))
        .route("/campaigns/:id/qualify", post(qualify_handler))
        .route("/campaigns/:id/dispatch", post(dispatch_handler))
        .route("/campaigns/:id/leads", get(leads_handler))
        .route("/jobs/:id", get(get_job_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
