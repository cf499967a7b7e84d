use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::utils::RagError;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub milvus: MilvusConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub classifier: ClassifierConfig,
    pub generator: GeneratorConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for one `/api/query` call, classification through generation.
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Ollama,
    /// text-embeddings-inference server
    HuggingFace,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub base_url: String,
    /// Falls back to OLLAMA_EMBEDDING_MODEL / HF_EMBEDDING_MODEL.
    pub model: Option<String>,
    /// Expected vector length; unchecked when unset.
    pub dimension: Option<usize>,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: None,
            dimension: None,
            timeout_seconds: 60,
        }
    }
}

impl EmbeddingConfig {
    /// Configured model, or the backend's environment fallback.
    pub fn resolved_model(&self) -> Option<String> {
        let env_key = match self.backend {
            EmbeddingBackend::Ollama => "OLLAMA_EMBEDDING_MODEL",
            EmbeddingBackend::HuggingFace => "HF_EMBEDDING_MODEL",
        };
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| std::env::var(env_key).ok().filter(|m| !m.trim().is_empty()))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MilvusConfig {
    pub uri: String,
    /// `user:password` or an API key; sent as a bearer token.
    pub token: Option<String>,
    pub collection_name: String,
    pub timeout_seconds: u64,
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:19530".to_string(),
            token: Some("root:Milvus".to_string()),
            collection_name: String::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_seconds: 120,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub limit: usize,
    pub metric: String,
    /// Passed through to the index as search params (`ef`, `radius`, `range_filter`...).
    pub search_params: serde_json::Value,
    pub output_field: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            metric: "COSINE".to_string(),
            search_params: serde_json::json!({ "ef": 32 }),
            output_field: "text".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStrategy {
    PatternLlm,
    ToolCalling,
}

/// What to do when the LLM tier of the classifier fails.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationFailurePolicy {
    Propagate,
    SkipRetrieval,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: ClassifierStrategy,
    pub on_failure: ClassificationFailurePolicy,
    /// Prior questions shown to the LLM tier.
    pub history_questions: usize,
    pub agent_max_iterations: usize,
    /// Replace the built-in lists when set.
    pub no_retrieval_patterns: Option<Vec<String>>,
    pub retrieval_patterns: Option<Vec<String>>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: ClassifierStrategy::PatternLlm,
            on_failure: ClassificationFailurePolicy::Propagate,
            history_questions: 2,
            agent_max_iterations: 3,
            no_retrieval_patterns: None,
            retrieval_patterns: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Subject area named in prompts and in the redirect sentence.
    pub domain: String,
    pub history_window: usize,
    pub answer_preview_chars: usize,
    pub include_history_in_rag: bool,
    pub redirect_markers: (String, String),
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            domain: "Milvus".to_string(),
            history_window: 3,
            answer_preview_chars: 100,
            include_history_in_rag: false,
            redirect_markers: (
                "I'm specialized in".to_string(),
                "I don't have information".to_string(),
            ),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Off by default: a repeated question returns the first answer whatever the history.
    pub key_includes_history: bool,
    pub max_entries: Option<usize>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,rag_router=debug".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

/// `APP_` prefix, `__` between nesting levels: `APP_MILVUS__COLLECTION_NAME=milvus_docs`.
fn environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(environment())
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.milvus.collection_name.trim().is_empty() {
            return Err(RagError::Configuration(
                "milvus.collection_name is not set".to_string(),
            ));
        }
        if self.embedding.resolved_model().is_none() {
            return Err(RagError::Configuration(format!(
                "embedding.model is not set for backend {:?}",
                self.embedding.backend
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(RagError::Configuration("llm.model is not set".to_string()));
        }
        if self.retrieval.limit == 0 {
            return Err(RagError::Configuration(
                "retrieval.limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
