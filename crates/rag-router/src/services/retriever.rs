use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::models::RetrievalResult;
use crate::services::providers::{EmbeddingProvider, SearchRequest, VectorIndex};
use crate::utils::RagError;

/// Embeds the question, searches the collection and stitches hits into one context.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    collection_name: String,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        collection_name: impl Into<String>,
        config: RetrievalConfig,
    ) -> Result<Self, RagError> {
        let collection_name = collection_name.into();
        if collection_name.trim().is_empty() {
            return Err(RagError::Configuration(
                "collection name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            embedder,
            index,
            collection_name,
            config,
        })
    }

    /// Never fails: embedding or search errors are logged and yield an empty result.
    pub async fn retrieve(&self, question: &str) -> RetrievalResult {
        match self.try_retrieve(question).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                RetrievalResult::empty()
            }
        }
    }

    async fn try_retrieve(&self, question: &str) -> Result<RetrievalResult, RagError> {
        let start = Instant::now();

        let embed_start = Instant::now();
        let vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| RagError::Retrieval(format!("embedding failed: {}", e)))?;
        debug!(
            "Embedding took {}ms (dim {})",
            embed_start.elapsed().as_millis(),
            vector.len()
        );

        let request = SearchRequest {
            collection_name: self.collection_name.clone(),
            vector,
            limit: self.config.limit,
            metric: self.config.metric.clone(),
            params: self.config.search_params.clone(),
            output_fields: vec![self.config.output_field.clone()],
        };

        let search_start = Instant::now();
        let hits = self
            .index
            .search(&request)
            .await
            .map_err(|e| RagError::Retrieval(format!("search failed: {}", e)))?;
        debug!(
            "Search took {}ms, {} hit(s)",
            search_start.elapsed().as_millis(),
            hits.len()
        );

        if hits.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let result = RetrievalResult {
            context: hits
                .iter()
                .map(|hit| hit.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            document_count: hits.len(),
        };

        info!(
            "Retrieved {} document(s) in {}ms",
            result.document_count,
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}
