use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::analysis::CreditAnalysisService;
use crate::auth::AuthUser;
use crate::config::Config;
use crate::dashboard::build_dashboard;
use crate::db_storage::AnalysisRepository;
use crate::errors::{AppError, ResultExt};
use crate::masking::mask_document;
use crate::models::{
    subscription_plans, ClientRequest, DashboardData, StoredAnalysis, SubscriptionPlan,
};
use crate::powerbi::{EmbedInfo, PowerBiClient};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Bureau aggregation plus persistence of successful runs.
    pub analysis_service: Arc<CreditAnalysisService>,
    /// Read side of stored analyses (history and dashboard).
    pub repository: Arc<dyn AnalysisRepository>,
    /// Embedded report client, absent when Power BI is not configured.
    pub powerbi: Option<PowerBiClient>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "credit-analysis-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/credit-analysis
///
/// Runs the bureau queries allowed by the caller's subscription and stores
/// the result. Any bureau failure fails the whole request.
pub async fn create_credit_analysis(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ClientRequest>,
) -> Result<(StatusCode, Json<StoredAnalysis>), AppError> {
    tracing::info!(
        "POST /credit-analysis - user: {}, tier: {}, cpf: {}",
        user.user_id,
        user.tier,
        mask_document(&request.cpf)
    );

    request.validate().map_err(AppError::BadRequest)?;

    let stored = state
        .analysis_service
        .analyze_and_store(&user.user_id, user.tier, &request)
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/credit-analysis
///
/// The caller's analysis history, newest first.
pub async fn list_credit_analyses(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<StoredAnalysis>>, AppError> {
    let analyses = state.repository.list_analyses(&user.user_id).await?;
    tracing::debug!(
        "Returning {} analyses for user {}",
        analyses.len(),
        user.user_id
    );
    Ok(Json(analyses))
}

/// GET /api/subscription-plans
pub async fn list_subscription_plans() -> Json<Vec<SubscriptionPlan>> {
    Json(subscription_plans())
}

/// GET /api/dashboard/data
pub async fn dashboard_data(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<DashboardData>, AppError> {
    let analyses = state
        .repository
        .list_analyses(&user.user_id)
        .await
        .context("Failed to load dashboard data")?;

    Ok(Json(build_dashboard(&analyses)))
}

/// GET /api/dashboard/powerbi-token
///
/// Premium only.
pub async fn powerbi_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<EmbedInfo>, AppError> {
    if !user.tier.includes_embedded_reports() {
        return Err(AppError::Forbidden(
            "Upgrade to the Premium plan to access advanced reports".to_string(),
        ));
    }

    let client = state
        .powerbi
        .as_ref()
        .ok_or_else(|| AppError::NotConfigured("Power BI integration".to_string()))?;

    Ok(Json(client.embed_info().await?))
}

/// Serves `openapi.yml` from the working directory.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "openapi.yml not found").into_response(),
    }
}

/// Serves the Swagger UI page, pointed at `serve_openapi_spec`.
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Credit Analysis API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}
