//! Collaborator seams: embedding, vector search and text generation.
//!
//! The pipeline only talks to these traits. HTTP implementations live in
//! `embedding_service`, `milvus` and `llm_service`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Trait for embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Trait for nearest-neighbour search over a collection
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Hits come back in the index's ranking order.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>>;
}

/// Trait for LLM service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single-turn completion.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub collection_name: String,
    pub vector: Vec<f32>,
    pub limit: usize,
    pub metric: String,
    pub params: serde_json::Value,
    pub output_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
}
