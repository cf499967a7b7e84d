use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MilvusConfig;
use crate::services::providers::{SearchHit, SearchRequest, VectorIndex};
use crate::utils::RagError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MilvusSearchBody<'a> {
    collection_name: &'a str,
    data: [&'a [f32]; 1],
    limit: usize,
    output_fields: &'a [String],
    search_params: MilvusSearchParams<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MilvusSearchParams<'a> {
    metric_type: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MilvusResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<serde_json::Map<String, Value>>,
}

/// Vector search against the Milvus REST v2 API.
#[derive(Clone)]
pub struct MilvusIndex {
    client: Client,
    search_url: String,
    token: Option<String>,
}

impl MilvusIndex {
    pub fn from_config(config: &MilvusConfig) -> Result<Self, RagError> {
        if config.uri.trim().is_empty() {
            return Err(RagError::Configuration("milvus.uri is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        info!("Milvus index at {}", config.uri);

        Ok(Self {
            client,
            search_url: format!(
                "{}/v2/vectordb/entities/search",
                config.uri.trim_end_matches('/')
            ),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait::async_trait]
impl VectorIndex for MilvusIndex {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let body = MilvusSearchBody {
            collection_name: &request.collection_name,
            data: [request.vector.as_slice()],
            limit: request.limit,
            output_fields: &request.output_fields,
            search_params: MilvusSearchParams {
                metric_type: &request.metric,
                params: &request.params,
            },
        };

        let mut builder = self.client.post(&self.search_url).json(&body);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("Failed to connect to Milvus")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Milvus API error ({}): {}", status, body);
        }

        let parsed: MilvusResponse = response
            .json()
            .await
            .context("Failed to parse Milvus search response")?;

        if parsed.code != 0 {
            anyhow::bail!(
                "Milvus search failed (code {}): {}",
                parsed.code,
                parsed.message.unwrap_or_default()
            );
        }

        let text_field = request
            .output_fields
            .first()
            .map(String::as_str)
            .unwrap_or("text");

        let hits: Vec<SearchHit> = parsed
            .data
            .iter()
            .map(|row| SearchHit {
                text: row
                    .get(text_field)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: row
                    .get("distance")
                    .and_then(Value::as_f64)
                    .unwrap_or_default() as f32,
            })
            .collect();

        debug!("Milvus returned {} hit(s)", hits.len());
        Ok(hits)
    }
}
