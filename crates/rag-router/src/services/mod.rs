pub mod cache;
pub mod classifier;
pub mod embedding_service;
pub mod generator;
pub mod llm_service;
pub mod milvus;
pub mod orchestrator;
pub mod providers;
pub mod retriever;

pub use cache::{CacheStats, MemoCache};
pub use classifier::{
    build_classifier, is_affirmative, PatternLlmClassifier, PatternSet, QueryClassifier,
    ToolCallingClassifier,
};
pub use embedding_service::EmbeddingService;
pub use generator::ResponseGenerator;
pub use llm_service::LlmService;
pub use milvus::MilvusIndex;
pub use orchestrator::RagOrchestrator;
pub use providers::{EmbeddingProvider, LlmProvider, SearchHit, SearchRequest, VectorIndex};
pub use retriever::Retriever;
