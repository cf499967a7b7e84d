use axum::{http::StatusCode, Extension, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::RagOrchestrator;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    classification_cache_entries: usize,
    response_cache_entries: usize,
}

pub async fn health_check(
    Extension(orchestrator): Extension<Arc<RagOrchestrator>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (classification, response) = orchestrator.cache_stats();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            classification_cache_entries: classification.entries,
            response_cache_entries: response.entries,
        }),
    )
}
