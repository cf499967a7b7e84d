use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rag_router::config::Settings;
use rag_router::handlers::build_router;
use rag_router::services::{EmbeddingService, LlmService, MilvusIndex, RagOrchestrator};
use rag_router::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;

    // Initialize logging
    let _log_guard = init_logger(&settings.logging)?;

    info!("Starting RAG router v{}", env!("CARGO_PKG_VERSION"));

    // Initialize collaborators
    let embedder = Arc::new(EmbeddingService::from_config(&settings.embedding)?);
    let index = Arc::new(MilvusIndex::from_config(&settings.milvus)?);
    let llm = Arc::new(LlmService::new(settings.llm.clone())?);

    let orchestrator = Arc::new(RagOrchestrator::from_settings(
        &settings, embedder, index, llm,
    )?);

    // Build router
    let app = build_router(
        orchestrator,
        Duration::from_secs(settings.server.request_timeout_seconds),
    );

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
