//! Ollama Embeddings
//!
//! Uses Ollama's `/api/embed` endpoint. The same model embeds queries and
//! knowledge-entry questions; no instruction prefix is applied, so stored
//! vectors and query vectors live in the same space.

use std::time::Duration;

use async_trait::async_trait;
use civic_qa_config::EmbeddingConfig as EmbeddingSettings;
use civic_qa_core::{Result as CoreResult, TextEmbedder};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::RagError;

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Ollama API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// HTTP timeout
    pub timeout: Duration,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: civic_qa_config::constants::endpoints::OLLAMA_DEFAULT.to_string(),
            model: "all-minilm".to_string(),
            embedding_dim: civic_qa_config::constants::retrieval::VECTOR_DIM,
            timeout: Duration::from_millis(civic_qa_config::constants::timeouts::EMBEDDING_MS),
        }
    }
}

impl From<&EmbeddingSettings> for OllamaEmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            embedding_dim: settings.dimension,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

/// Request to Ollama embedding API
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response from Ollama embedding API
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::Timeout(format!("Ollama embedding after {:?}", self.config.timeout))
                } else {
                    RagError::Embedding(format!("Ollama request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama embedding failed: {} - {}",
                status, text
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        self.check_shape(texts.len(), embed_response.embeddings)
    }

    fn check_shape(
        &self,
        expected: usize,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, RagError> {
        if embeddings.len() != expected {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                expected,
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.config.embedding_dim) {
            return Err(RagError::Embedding(format!(
                "Model '{}' returned dimension {}, configured {}",
                self.config.model,
                bad.len(),
                self.config.embedding_dim
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl TextEmbedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| civic_qa_core::Error::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(self.embed_many(texts).await?)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = EmbeddingSettings {
            endpoint: "http://ollama:11434/".to_string(),
            dimension: 768,
            timeout_ms: 1200,
            ..EmbeddingSettings::default()
        };
        let config = OllamaEmbeddingConfig::from(&settings);
        assert_eq!(config.embedding_dim, 768);
        assert_eq!(config.timeout, Duration::from_millis(1200));

        let embedder = OllamaEmbedder::new(config).unwrap();
        assert_eq!(embedder.url(), "http://ollama:11434/api/embed");
    }

    #[test]
    fn test_request_serializes_input_array() {
        let input = vec!["a".to_string(), "b".to_string()];
        let json = serde_json::to_value(EmbedRequest {
            model: "all-minilm",
            input: &input,
        })
        .unwrap();
        assert_eq!(json["input"][1], "b");
    }

    #[test]
    fn test_shape_check() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            embedding_dim: 3,
            ..OllamaEmbeddingConfig::default()
        })
        .unwrap();
        assert!(embedder.check_shape(1, vec![vec![0.1, 0.2, 0.3]]).is_ok());
        assert!(embedder.check_shape(1, vec![vec![0.1, 0.2]]).is_err());
        assert!(embedder.check_shape(2, vec![vec![0.1, 0.2, 0.3]]).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            ..OllamaEmbeddingConfig::default()
        })
        .unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
