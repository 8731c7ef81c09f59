//! PDI chat - assistant-backed chat service for development plans
//!
//! Routes each chat turn through a remote assistant engine, services the
//! tool calls its runs request, and persists the exchange.

mod api;
mod assistant;
mod config;
mod db;
mod runtime;
mod state_machine;
mod tools;

use api::{create_router, AppState};
use assistant::{AssistantService, LoggingService, OpenAIAssistantService};
use config::AppConfig;
use db::Database;
use runtime::{DatabaseStorage, ProductionTurnService, Storage};
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdi_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let storage: Arc<dyn Storage> = Arc::new(DatabaseStorage::new(db));

    let client: Arc<dyn AssistantService> =
        Arc::new(OpenAIAssistantService::new(&config.assistant)?);
    let assistant: Arc<dyn AssistantService> = Arc::new(LoggingService::new(client));
    tracing::info!(
        base_url = %config.assistant.base_url,
        assistant_id = %config.assistant.assistant_id,
        poll_interval_ms = %config.poll.interval.as_millis(),
        max_polls = config.poll.max_polls,
        "Assistant client initialized"
    );

    let turns: Arc<ProductionTurnService> = Arc::new(runtime::TurnService::new(
        storage,
        assistant,
        Arc::new(ToolRegistry::standard()),
        config.assistant.assistant_id.clone(),
        config.poll,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true).deflate(true).zstd(true);

    let app = create_router(AppState::new(Arc::clone(&turns)))
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("PDI chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received, cancelling in-flight turns");
            turns.shutdown();
        })
        .await?;

    Ok(())
}
