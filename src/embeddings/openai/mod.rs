
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{BlockingBatchEmbedder, HttpClient, embed_blocking};
use super::{Embedding, EmbeddingProvider};
use crate::cancel::CancellationToken;
use crate::config::EmbeddingConfig;
use crate::{RagError, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-ada-002";

const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Client for OpenAI-compatible `/v1/embeddings` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: HttpClient,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = HttpClient::new(config.base_url())
            .map_err(|e| RagError::Config(format!("{:#}", e)))?
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_retry_attempts(config.retry_attempts)
            .with_bearer_token(api_key);

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
}

impl BlockingBatchEmbedder for OpenAiEmbedder {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(
        &self,
        token: &CancellationToken,
        texts: &[String],
    ) -> anyhow::Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .client
            .post_json(token, EMBEDDINGS_PATH, &request_json)
            .context("Failed to generate embeddings")?;

        let response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        debug!(
            "Model {} embedded {} texts ({} prompt tokens, {} total)",
            response.model,
            response.data.len(),
            response.usage.prompt_tokens,
            response.usage.total_tokens
        );

        order_by_index(response.data, texts.len())
    }
}

/// Place each returned vector at the input position it reports
fn order_by_index(data: Vec<EmbeddingData>, expected: usize) -> anyhow::Result<Vec<Embedding>> {
    if data.len() != expected {
        anyhow::bail!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            data.len()
        );
    }

    let mut slots: Vec<Option<Embedding>> = vec![None; expected];
    for item in data {
        let slot = slots
            .get_mut(item.index)
            .with_context(|| format!("Response index {} out of range", item.index))?;
        if slot.replace(item.embedding).is_some() {
            anyhow::bail!("Response index {} appears more than once", item.index);
        }
    }

    // Every slot is filled: counts match and no index repeats
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, token: &CancellationToken, texts: &[String]) -> Result<Vec<Embedding>> {
        embed_blocking(self, token, texts).await
    }
}
