//! HTTP clients for an Ollama-compatible generation and embedding backend.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::traits::{EmbeddingBackend, GenerationBackend};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.generation_url.clone(),
            model: config.generation_model.clone(),
            timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .timeout(self.timeout)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|error| PipelineError::from_transport(self.name(), error))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PipelineError::BackendUnavailable(format!(
                "{} returned {status}",
                self.name()
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::BackendResponse {
                backend: self.name().to_string(),
                details: status.to_string(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| PipelineError::from_transport(self.name(), error))?;

        payload
            .pointer("/response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::BackendResponse {
                backend: self.name().to_string(),
                details: "payload has no response field".to_string(),
            })
    }

    fn name(&self) -> &str {
        "ollama-generate"
    }
}

pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.embedding_url.clone(),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .timeout(self.timeout)
            .json(&json!({
                "model": self.model,
                "prompt": text,
            }))
            .send()
            .await
            .map_err(|error| PipelineError::from_transport(self.name(), error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::BackendUnavailable(format!(
                "{} returned {status}",
                self.name()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| PipelineError::from_transport(self.name(), error))?;

        let vector = payload
            .pointer("/embedding")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|value| value as f32)
                    .collect::<Vec<_>>()
            })
            .ok_or_else(|| PipelineError::BackendResponse {
                backend: self.name().to_string(),
                details: "payload has no embedding field".to_string(),
            })?;

        if vector.len() != self.dimensions {
            return Err(PipelineError::BackendResponse {
                backend: self.name().to_string(),
                details: format!(
                    "embedding dimension {} != configured {}",
                    vector.len(),
                    self.dimensions
                ),
            });
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "ollama-embed"
    }
}
