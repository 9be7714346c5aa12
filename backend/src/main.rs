//! Plastics back office - Backend Server
//!
//! Order intake, carton-level stock tracking, stock verification and
//! production paperwork for a plastics manufacturer.

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod external;
mod handlers;
mod middleware;
mod routes;
mod services;

pub use config::Config;

use external::{CsvDocumentGenerator, DocumentGenerator, ExtractionClient};
use services::{DbEmailProcessor, InboxMonitor, InboxService, OrderService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub documents: Arc<dyn DocumentGenerator>,
    pub inbox: InboxMonitor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rjb_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting plastics back office server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let documents: Arc<dyn DocumentGenerator> =
        Arc::new(CsvDocumentGenerator::new(config.documents.company_name.clone()));

    let extraction = ExtractionClient::from_config(&config.extraction)?;
    if extraction.is_none() {
        tracing::warn!("Extraction endpoint not configured; inbox polls will fail until it is set");
    }

    let processor = DbEmailProcessor::new(
        InboxService::new(db_pool.clone()),
        OrderService::new(db_pool.clone(), documents.clone()),
        extraction,
    );
    let inbox = InboxMonitor::new(
        Arc::new(processor),
        Duration::from_secs(config.inbox.poll_interval_secs),
        Duration::from_secs(config.inbox.max_backoff_secs),
    );

    if config.inbox.autostart {
        inbox.start().await;
    }

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        documents,
        inbox: inbox.clone(),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr = config.server.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    inbox.stop().await;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Plastics Back Office API v1.0"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
