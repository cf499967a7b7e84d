mod settings;

pub use settings::{
    CacheConfig, ClassificationFailurePolicy, ClassifierConfig, ClassifierStrategy,
    EmbeddingBackend, EmbeddingConfig, GeneratorConfig, LlmConfig, LoggingConfig,
    MilvusConfig, RetrievalConfig, ServerConfig, Settings,
};
