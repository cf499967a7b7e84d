pub mod health;
pub mod query;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::services::RagOrchestrator;

pub use query::RequestTimeout;

pub fn build_router(orchestrator: Arc<RagOrchestrator>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/query", post(query::query_handler))
        // Shared state
        .layer(Extension(orchestrator))
        .layer(Extension(RequestTimeout(request_timeout)))
        // CORS
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Tracing
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}
