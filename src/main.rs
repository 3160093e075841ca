use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credit_analysis_api::analysis::{CreditAnalysisService, CreditAnalyzer};
use credit_analysis_api::audit::{AuditLogger, PgAuditSink};
use credit_analysis_api::config::Config;
use credit_analysis_api::db::Database;
use credit_analysis_api::db_storage::{AnalysisRepository, PgAnalysisRepository};
use credit_analysis_api::handlers::{self, AppState};
use credit_analysis_api::powerbi::PowerBiClient;
use credit_analysis_api::routes::{self, MAX_BODY_BYTES};

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    match &config.frontend_origin {
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .map_err(|_| anyhow::anyhow!("FRONTEND_ORIGIN is not a valid header value"))?;
            tracing::info!("CORS restricted to {:?}", origin);
            Ok(CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
        }
        None => {
            tracing::warn!("FRONTEND_ORIGIN not set, CORS is permissive");
            Ok(CorsLayer::permissive())
        }
    }
}

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the database (with migrations), the
/// bureau clients and the optional Power BI client, then starts the Axum
/// server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credit_analysis_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool and apply migrations
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let audit = AuditLogger::new(Arc::new(PgAuditSink::new(db.pool.clone())));
    let repository: Arc<dyn AnalysisRepository> =
        Arc::new(PgAnalysisRepository::new(db.pool.clone()));

    let analyzer = CreditAnalyzer::from_config(&config, audit)?;
    tracing::info!("Bureau clients initialized ({:?} responses)", config.response_mode);

    let powerbi = config.powerbi.clone().map(PowerBiClient::new).transpose()?;
    if powerbi.is_some() {
        tracing::info!("✓ Power BI client initialized");
    }

    let cors = cors_layer(&config)?;

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        analysis_service: Arc::new(CreditAnalysisService::new(analyzer, repository.clone())),
        repository,
        powerbi,
    });

    // Configure rate limiter: 100 requests per 15 minutes per IP
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(9)
            .burst_size(100)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = routes::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            // Rate limiting: 100 requests per 15 minutes per IP
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
