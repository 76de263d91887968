//! Offline embedder based on feature hashing.
//!
//! [`HashingEmbedder`] maps each lowercase alphanumeric token of a text onto a
//! fixed number of buckets and L2-normalizes the counts. It needs no network
//! or model files, so it backs offline indexing and deterministic tests. It
//! captures shared vocabulary rather than meaning.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Embedding, EmbeddingProvider};
use crate::cancel::{CancellationToken, ensure_active};
use crate::{RagError, Result};

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    #[inline]
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one text; empty or token-free text maps to the zero vector
    #[inline]
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0_u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

impl Default for HashingEmbedder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, token: &CancellationToken, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Err(RagError::Embedding(
                "No texts provided for embedding generation".to_string(),
            ));
        }
        ensure_active(token)?;

        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
