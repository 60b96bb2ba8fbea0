pub mod health;
pub mod quota_handler;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::usecase::{BuildCapabilitiesUseCase, CheckAndConsumeUseCase, ReleaseQuotaUseCase};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub check_and_consume_uc: Arc<CheckAndConsumeUseCase>,
    pub release_quota_uc: Arc<ReleaseQuotaUseCase>,
    pub build_capabilities_uc: Arc<BuildCapabilitiesUseCase>,
    /// "redis" / "postgres" / "in-memory"
    pub usage_store: &'static str,
}

/// Build the REST API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route(
            "/api/v1/subjects/:subject_id/quota/consume",
            post(quota_handler::consume_quota),
        )
        .route(
            "/api/v1/subjects/:subject_id/quota/release",
            post(quota_handler::release_quota),
        )
        .route(
            "/api/v1/subjects/:subject_id/capabilities",
            get(quota_handler::get_capabilities),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
