// Indexer module
// Turns source files into chunks and hands them to the vector store


use std::path::{Path, PathBuf};
use std::slice;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cancel::{CancellationToken, cancellable, ensure_active};
use crate::chunking::{Chunk, DEFAULT_CHUNK_SIZE, document_id, split_into_chunks};
use crate::store::{Metadata, MetadataValue, VectorStore};
use crate::walker::{language_tag, source_files};
use crate::{RagError, Result};

/// Totals of a successful directory scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
}

/// Splits files into chunks and writes each chunk to a [`VectorStore`]
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    root: PathBuf,
    chunk_size: usize,
}

impl Indexer {
    #[inline]
    pub fn new(store: Arc<dyn VectorStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Target chunk size in characters
    #[inline]
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Index one file, writing each chunk as its own store call.
    ///
    /// Stops at the first failing chunk. Chunks written before the failure
    /// stay in the store. Returns the number of chunks written.
    #[inline]
    pub async fn process_file(&self, token: &CancellationToken, path: &Path) -> Result<usize> {
        let chunks = self.read_chunks(token, path).await?;
        let file_path = path.to_string_lossy();
        let language = language_tag(path);

        for chunk in &chunks {
            ensure_active(token)?;

            let metadata = chunk_metadata(&file_path, chunk, &language);
            let id = document_id(&file_path, &chunk.text);

            self.store
                .add(
                    token,
                    slice::from_ref(&chunk.text),
                    slice::from_ref(&metadata),
                    slice::from_ref(&id),
                )
                .await
                .map_err(|e| {
                    e.with_context(|| {
                        format!(
                            "Failed to index chunk {} of {} in {}",
                            chunk.index + 1,
                            chunk.total,
                            path.display()
                        )
                    })
                })?;
            debug!("Indexed chunk {}/{} of {}", chunk.index + 1, chunk.total, file_path);
        }

        info!("Indexed {} ({} chunks)", path.display(), chunks.len());
        Ok(chunks.len())
    }

    /// Index every eligible file under the root, in walk order.
    ///
    /// The first walk or file error aborts the scan and is returned.
    #[inline]
    pub async fn index_directory(&self, token: &CancellationToken) -> Result<IndexStats> {
        info!("Indexing {}", self.root.display());
        let mut stats = IndexStats::default();

        for entry in source_files(&self.root) {
            ensure_active(token)?;
            let path = entry?;

            stats.chunks_indexed += self.process_file(token, &path).await?;
            stats.files_indexed += 1;
        }

        info!(
            "Indexed {} files ({} chunks) under {}",
            stats.files_indexed,
            stats.chunks_indexed,
            self.root.display()
        );
        Ok(stats)
    }

    /// Delete the chunks the file's current content maps to.
    ///
    /// Returns the number of IDs submitted for deletion.
    #[inline]
    pub async fn remove_file(&self, token: &CancellationToken, path: &Path) -> Result<usize> {
        let chunks = self.read_chunks(token, path).await?;
        if chunks.is_empty() {
            debug!("{} has no chunks to remove", path.display());
            return Ok(0);
        }

        let file_path = path.to_string_lossy();
        let ids: Vec<String> = chunks
            .iter()
            .map(|chunk| document_id(&file_path, &chunk.text))
            .collect();

        self.store
            .delete(token, &ids)
            .await
            .map_err(|e| e.with_context(|| format!("Failed to remove {}", path.display())))?;

        info!("Removed {} chunks of {}", ids.len(), path.display());
        Ok(ids.len())
    }

    async fn read_chunks(&self, token: &CancellationToken, path: &Path) -> Result<Vec<Chunk>> {
        ensure_active(token)?;
        let bytes = cancellable(token, async {
            tokio::fs::read(path).await.map_err(|source| RagError::Io {
                path: path.to_path_buf(),
                source,
            })
        })
        .await?;

        let text = String::from_utf8_lossy(&bytes);
        Ok(split_into_chunks(&text, self.chunk_size))
    }
}

fn chunk_metadata(file_path: &str, chunk: &Chunk, language: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("file_path".to_string(), MetadataValue::from(file_path));
    metadata.insert("chunk_index".to_string(), MetadataValue::from(chunk.index));
    metadata.insert("total_chunks".to_string(), MetadataValue::from(chunk.total));
    metadata.insert("language".to_string(), MetadataValue::from(language));
    metadata
}
