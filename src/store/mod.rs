// Vector store module
// Persists chunk text with metadata and answers nearest-neighbour queries

pub mod lance;
pub mod memory;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cancel::{CancellationToken, cancellable, ensure_active};
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::{RagError, Result};

pub use lance::LanceCollection;
pub use memory::MemoryCollection;

/// Scalar value attached to a stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetadataValue {
    #[inline]
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// String-keyed scalar metadata, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Parallel sequences returned by a query, nearest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

/// A document together with its embedding, as handed to a [`Collection`]
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub vector: Embedding,
}

/// Persists documents keyed by ID and answers similarity queries.
///
/// Implementations embed text through their own provider: `add` embeds the
/// documents, `query` embeds the query text.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace documents. The three slices must have equal length.
    async fn add(
        &self,
        token: &CancellationToken,
        documents: &[String],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<()>;

    /// Up to `limit` documents nearest to `query_text`, nearest first
    async fn query(
        &self,
        token: &CancellationToken,
        query_text: &str,
        limit: usize,
    ) -> Result<QueryResult>;

    /// Remove documents by ID; unknown IDs are ignored
    async fn delete(&self, token: &CancellationToken, ids: &[String]) -> Result<()>;

    /// Release backing resources. Every later call fails.
    async fn close(&self) -> Result<()>;
}

/// Single-owner storage of embedded records.
///
/// A collection is not synchronized; [`EmbeddedStore`] serializes access.
#[async_trait]
pub trait Collection: Send + Sync {
    async fn upsert(&mut self, records: Vec<Record>) -> Result<()>;

    async fn nearest(&self, vector: &[f32], limit: usize) -> Result<QueryResult>;

    async fn remove(&mut self, ids: &[String]) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    async fn close(&mut self) -> Result<()>;
}

/// [`VectorStore`] built from an embedding provider and a [`Collection`].
///
/// Writers take the lock exclusively and queries share it. Embeddings are
/// computed before the lock is taken, so a slow provider never blocks readers.
pub struct EmbeddedStore<C> {
    name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: RwLock<Option<C>>,
}

impl<C: Collection> EmbeddedStore<C> {
    #[inline]
    pub fn new(name: impl Into<String>, embedder: Arc<dyn EmbeddingProvider>, collection: C) -> Self {
        Self {
            name: name.into(),
            embedder,
            collection: RwLock::new(Some(collection)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored documents
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let guard = self.collection.read().await;
        guard.as_ref().ok_or_else(closed)?.count().await
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.collection.read().await.is_none() {
            return Err(closed());
        }
        Ok(())
    }
}

fn closed() -> RagError {
    RagError::Store("store is closed".to_string())
}

#[async_trait]
impl<C: Collection + 'static> VectorStore for EmbeddedStore<C> {
    async fn add(
        &self,
        token: &CancellationToken,
        documents: &[String],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<()> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(RagError::Store(format!(
                "Length mismatch: {} documents, {} metadatas, {} ids",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        if documents.is_empty() {
            debug!("No documents to add to {}", self.name);
            return Ok(());
        }
        self.ensure_open().await?;

        let vectors = self
            .embedder
            .embed(token, documents)
            .await
            .map_err(|e| e.with_context(|| format!("Failed to embed documents for {}", self.name)))?;
        if vectors.len() != documents.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between input count ({}) and embedding count ({})",
                documents.len(),
                vectors.len()
            )));
        }

        let records: Vec<Record> = ids
            .iter()
            .zip(documents)
            .zip(metadatas)
            .zip(vectors)
            .map(|(((id, document), metadata), vector)| Record {
                id: id.clone(),
                document: document.clone(),
                metadata: metadata.clone(),
                vector,
            })
            .collect();

        ensure_active(token)?;
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(closed)?;
        cancellable(token, collection.upsert(records)).await?;

        debug!("Added {} documents to {}", documents.len(), self.name);
        Ok(())
    }

    async fn query(
        &self,
        token: &CancellationToken,
        query_text: &str,
        limit: usize,
    ) -> Result<QueryResult> {
        self.ensure_open().await?;
        if limit == 0 {
            return Ok(QueryResult::default());
        }

        let vector = self
            .embedder
            .embed(token, &[query_text.to_string()])
            .await
            .map_err(|e| e.with_context(|| "Failed to embed query".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Provider returned no query embedding".to_string()))?;

        ensure_active(token)?;
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(closed)?;
        let result = cancellable(token, collection.nearest(&vector, limit)).await?;

        debug!(
            "Query against {} returned {} documents",
            self.name,
            result.documents.len()
        );
        Ok(result)
    }

    async fn delete(&self, token: &CancellationToken, ids: &[String]) -> Result<()> {
        ensure_active(token)?;
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(closed)?;
        if ids.is_empty() {
            return Ok(());
        }

        cancellable(token, collection.remove(ids)).await?;
        debug!("Deleted {} ids from {}", ids.len(), self.name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.collection.write().await;
        if let Some(mut collection) = guard.take() {
            collection.close().await?;
            info!("Closed vector store {}", self.name);
        }
        Ok(())
    }
}
