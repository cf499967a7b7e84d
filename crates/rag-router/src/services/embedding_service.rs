use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::services::providers::EmbeddingProvider;
use crate::utils::RagError;

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct TeiEmbeddingRequest<'a, T: Serialize> {
    inputs: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// HTTP embedding client for Ollama or a HuggingFace text-embeddings-inference server.
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    backend: EmbeddingBackend,
    base_url: String,
    model: String,
    dimension: Option<usize>,
}

impl EmbeddingService {
    /// Fails with a configuration error when no model is configured for the backend.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let model = config.resolved_model().ok_or_else(|| {
            RagError::Configuration(format!(
                "no embedding model configured for backend {:?}",
                config.backend
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        info!(
            "Embedding service: {:?} at {} (model: {})",
            config.backend, config.base_url, model
        );

        Ok(Self {
            client,
            backend: config.backend,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            dimension: config.dimension,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            anyhow::bail!("Generated embedding is empty");
        }
        if let Some(expected) = self.dimension {
            if embedding.len() != expected {
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected,
                    embedding.len()
                );
            }
        }
        Ok(())
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let json = match self.backend {
            EmbeddingBackend::Ollama => {
                let request = OllamaEmbeddingRequest {
                    model: &self.model,
                    prompt: text,
                };
                self.post("/api/embeddings", &request).await?
            }
            EmbeddingBackend::HuggingFace => {
                let request = TeiEmbeddingRequest {
                    inputs: text,
                    model: Some(self.model.as_str()),
                };
                self.post("/embed", &request).await?
            }
        };

        let embedding = parse_embeddings(&json)?
            .into_iter()
            .next()
            .context("Empty embedding list returned from embedding server")?;

        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = match self.backend {
            EmbeddingBackend::Ollama => {
                let mut embeddings = Vec::with_capacity(texts.len());
                for text in texts {
                    embeddings.push(self.embed_one(text).await?);
                }
                return Ok(embeddings);
            }
            EmbeddingBackend::HuggingFace => {
                let request = TeiEmbeddingRequest {
                    inputs: texts,
                    model: Some(self.model.as_str()),
                };
                parse_embeddings(&self.post("/embed", &request).await?)?
            }
        };

        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, got {}",
                texts.len(),
                embeddings.len()
            );
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }
        Ok(embeddings)
    }
}

fn floats(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
}

/// Accepts the shapes the supported servers return:
/// `{"embedding": [..]}` (Ollama), `{"embeddings": [[..]]}` (Ollama /api/embed),
/// `[[..], ..]` or `[..]` (TEI), `{"data": [{"embedding": [..]}]}` (OpenAI).
fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>> {
    if let Some(embedding) = json.get("embedding").and_then(floats) {
        return Ok(vec![embedding]);
    }

    if let Some(rows) = json.get("embeddings").and_then(Value::as_array) {
        return Ok(rows.iter().filter_map(floats).collect());
    }

    if let Some(data) = json.get("data").and_then(Value::as_array) {
        return Ok(data
            .iter()
            .filter_map(|item| item.get("embedding").and_then(floats))
            .collect());
    }

    if let Some(arr) = json.as_array() {
        if arr.is_empty() {
            anyhow::bail!("Empty array returned from embedding server");
        }
        if arr[0].is_array() {
            return Ok(arr.iter().filter_map(floats).collect());
        }
        if arr[0].is_number() {
            return Ok(floats(json).into_iter().collect());
        }
    }

    anyhow::bail!("Unrecognized embedding response format: {}", json)
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_many(texts).await
    }
}
