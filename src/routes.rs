use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::{self, AppState};

/// Request size limit: 1MB.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Documentation and `/api` routes. Rate limiting is layered on by the caller.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // API Documentation
        .route("/docs", get(handlers::serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(handlers::serve_openapi_spec))
        // Credit analysis
        .route(
            "/api/credit-analysis",
            post(handlers::create_credit_analysis).get(handlers::list_credit_analyses),
        )
        .route(
            "/api/subscription-plans",
            get(handlers::list_subscription_plans),
        )
        // Dashboard
        .route("/api/dashboard/data", get(handlers::dashboard_data))
        .route(
            "/api/dashboard/powerbi-token",
            get(handlers::powerbi_token),
        )
}

/// Full application without rate limiting or CORS.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
