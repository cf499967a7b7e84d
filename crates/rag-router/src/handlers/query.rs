use axum::{Extension, Json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::models::{QueryRequest, QueryResponse};
use crate::services::RagOrchestrator;
use crate::utils::RagError;

/// Upper bound for a whole `/api/query` call.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout(pub Duration);

pub async fn query_handler(
    Extension(orchestrator): Extension<Arc<RagOrchestrator>>,
    Extension(RequestTimeout(limit)): Extension<RequestTimeout>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, RagError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("query", %request_id);

    async move {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(RagError::BadRequest("question must not be empty".to_string()));
        }

        info!(
            "Query ({} chars, {} history entries)",
            question.len(),
            request.history.len()
        );

        let outcome =
            tokio::time::timeout(limit, orchestrator.query(question, &request.history))
                .await
                .map_err(|_| RagError::Timeout(limit))??;

        let is_redirect = orchestrator.generator().is_redirect(&outcome.answer);

        Ok(Json(QueryResponse {
            answer: outcome.answer,
            doc_count: outcome.doc_count,
            retrieval_attempted: outcome.retrieval_attempted,
            is_redirect,
        }))
    }
    .instrument(span)
    .await
}
