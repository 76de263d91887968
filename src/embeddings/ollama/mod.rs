
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::http::{BlockingBatchEmbedder, HttpClient, embed_blocking};
use super::{Embedding, EmbeddingProvider};
use crate::RagError;
use crate::cancel::CancellationToken;
use crate::config::EmbeddingConfig;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text:latest";

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: HttpClient,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Entry of `GET /api/tags`; only the tag name is used
#[derive(Debug, Deserialize)]
struct PulledModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<PulledModel>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> crate::Result<Self> {
        let client = HttpClient::new(config.base_url())
            .map_err(|e| RagError::Config(format!("{:#}", e)))?
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_retry_attempts(config.retry_attempts);

        Ok(Self {
            client,
            model: config.model().to_string(),
            batch_size: config.batch_size as usize,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the server answers and has pulled the configured model
    #[inline]
    pub fn health_check(&self, token: &CancellationToken) -> Result<()> {
        let base_url = self.client.base_url();
        debug!("Checking Ollama server at {}", base_url);

        let pulled = self
            .pulled_models(token)
            .with_context(|| format!("Ollama server at {} is unreachable", base_url))?;

        if !pulled.iter().any(|name| *name == self.model) {
            warn!("Model {} missing from {:?}", self.model, pulled);
            anyhow::bail!(
                "Model '{}' is not available on {}; pulled models: {}",
                self.model,
                base_url,
                pulled.join(", ")
            );
        }

        info!("Ollama at {} serves model {}", base_url, self.model);
        Ok(())
    }

    /// Names of every model the server has pulled
    #[inline]
    pub fn pulled_models(&self, token: &CancellationToken) -> Result<Vec<String>> {
        let body = self.client.get(token, "api/tags").context("Failed to fetch model tags")?;
        let tags: TagsResponse =
            serde_json::from_str(&body).context("Malformed /api/tags response")?;

        debug!("Ollama reports {} pulled models", tags.models.len());
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl BlockingBatchEmbedder for OllamaEmbedder {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, token: &CancellationToken, texts: &[String]) -> Result<Vec<Embedding>> {
        let request = BatchEmbedRequest {
            model: &self.model,
            input: texts,
        };
        let body = serde_json::to_string(&request).context("Failed to encode embed request")?;

        let response = self
            .client
            .post_json(token, "api/embed", &body)
            .with_context(|| format!("Ollama embed request for {} texts failed", texts.len()))?;

        let parsed: BatchEmbedResponse =
            serde_json::from_str(&response).context("Malformed /api/embed response")?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(
        &self,
        token: &CancellationToken,
        texts: &[String],
    ) -> crate::Result<Vec<Embedding>> {
        embed_blocking(self, token, texts).await
    }
}
