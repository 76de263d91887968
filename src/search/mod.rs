// Search module
// Answers natural-language queries against the vector store


use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::store::{Metadata, VectorStore};
use crate::{RagError, Result};

/// One stored chunk matching a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: Metadata,
}

pub struct SearchService {
    store: Arc<dyn VectorStore>,
}

impl SearchService {
    #[inline]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Up to `limit` chunks nearest to `query`, nearest first
    #[inline]
    pub async fn search(
        &self,
        token: &CancellationToken,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let context = || format!("Search for {:?} failed", query);

        let result = self
            .store
            .query(token, query, limit)
            .await
            .map_err(|e| e.with_context(context))?;

        if result.documents.len() != result.metadatas.len() {
            return Err(RagError::Store(format!(
                "{}: store returned {} documents but {} metadatas",
                context(),
                result.documents.len(),
                result.metadatas.len()
            )));
        }

        let results: Vec<SearchResult> = result
            .documents
            .into_iter()
            .zip(result.metadatas)
            .map(|(content, metadata)| SearchResult { content, metadata })
            .collect();

        debug!("Search for {:?} returned {} results", query, results.len());
        Ok(results)
    }
}
