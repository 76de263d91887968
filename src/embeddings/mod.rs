// Embeddings module
// Turns batches of text into vectors through a pluggable provider

pub mod hashing;
pub mod http;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;

use crate::Result;
use crate::cancel::CancellationToken;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// A single text's position in embedding space
pub type Embedding = Vec<f32>;

/// Converts text into embeddings.
///
/// Implementations return exactly one embedding per input text, in input
/// order, and reject an empty batch with an error.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, token: &CancellationToken, texts: &[String]) -> Result<Vec<Embedding>>;
}
