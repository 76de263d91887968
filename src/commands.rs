use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::config::{Config, EmbeddingConfig, ProviderKind, StoreBackend};
use crate::embeddings::{EmbeddingProvider, HashingEmbedder, OllamaEmbedder, OpenAiEmbedder};
use crate::indexer::Indexer;
use crate::search::{SearchResult, SearchService};
use crate::store::{
    EmbeddedStore, LanceCollection, MemoryCollection, MetadataValue, VectorStore,
};
use crate::{RagError, Result};

/// Build the embedding provider named by the configuration
#[inline]
pub fn build_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => {
            let api_key = config
                .api_key()
                .map_err(|e| RagError::Config(e.to_string()))?;
            Arc::new(OpenAiEmbedder::new(config, api_key)?)
        }
        ProviderKind::Ollama => Arc::new(OllamaEmbedder::new(config)?),
        ProviderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension as usize)),
    };

    info!(
        "Using {:?} embeddings with model {}",
        config.provider,
        config.model()
    );
    Ok(provider)
}

/// Open the configured vector store on top of `embedder`
#[inline]
pub async fn open_store(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn VectorStore>> {
    let name = config.store.collection.clone();

    match config.store.backend {
        StoreBackend::LanceDb => {
            let collection = LanceCollection::open(&config.vector_database_path(), &name)
                .await
                .map_err(|e| e.with_context(|| "Failed to open vector store".to_string()))?;
            Ok(Arc::new(EmbeddedStore::new(name, embedder, collection)))
        }
        StoreBackend::Memory => {
            warn!("The memory store backend keeps nothing once this command exits");
            Ok(Arc::new(EmbeddedStore::new(
                name,
                embedder,
                MemoryCollection::new(),
            )))
        }
    }
}

async fn open_pipeline(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let embedder = build_provider(&config.embedding)?;
    open_store(config, embedder).await
}

/// Close `store` once `outcome` is known.
///
/// The operation's own error wins; a close failure is only returned when the
/// operation succeeded and is logged otherwise.
async fn close_after<T>(store: &dyn VectorStore, outcome: Result<T>) -> Result<T> {
    let closed = store.close().await;
    match outcome {
        Ok(value) => closed.map(|()| value),
        Err(err) => {
            if let Err(close_err) = closed {
                warn!("Failed to close vector store: {}", close_err);
            }
            Err(err)
        }
    }
}

/// Index every source file under `root`
#[inline]
pub async fn index_codebase(config: &Config, root: &Path, token: &CancellationToken) -> Result<()> {
    if config.embedding.provider == ProviderKind::Ollama {
        let client = OllamaEmbedder::new(&config.embedding)?;
        let check_token = token.clone();
        tokio::task::spawn_blocking(move || client.health_check(&check_token))
            .await
            .context("Ollama health check task failed")?
            .context("Ollama is not ready for indexing")?;
    }

    let store = open_pipeline(config).await?;
    let indexer = Indexer::new(Arc::clone(&store), root).with_chunk_size(config.indexing.chunk_size);

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} Indexing {msg} [{elapsed}]")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(root.display().to_string());
    bar.enable_steady_tick(Duration::from_millis(120));

    let outcome = indexer.index_directory(token).await;
    bar.finish_and_clear();
    let stats = close_after(store.as_ref(), outcome).await?;
    println!(
        "{} Indexed {} files ({} chunks) from {}",
        style("✓").green(),
        style(stats.files_indexed).cyan(),
        style(stats.chunks_indexed).cyan(),
        root.display()
    );
    Ok(())
}

/// Print the chunks nearest to `query`
#[inline]
pub async fn search_code(
    config: &Config,
    query: &str,
    limit: usize,
    json: bool,
    token: &CancellationToken,
) -> Result<()> {
    let store = open_pipeline(config).await?;
    let outcome = SearchService::new(Arc::clone(&store))
        .search(token, query, limit)
        .await;
    let results = close_after(store.as_ref(), outcome).await?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
        println!("{}", rendered);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching code found for {:?}.", query);
        println!("Use 'code-rag index <dir>' to index a codebase first.");
        return Ok(());
    }

    for (position, result) in results.iter().enumerate() {
        print_result(position + 1, result);
    }
    Ok(())
}

fn print_result(position: usize, result: &SearchResult) {
    let field = |key: &str| {
        result
            .metadata
            .get(key)
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    };
    let chunk_number = result
        .metadata
        .get("chunk_index")
        .and_then(MetadataValue::as_int)
        .map_or_else(|| "?".to_string(), |index| (index + 1).to_string());

    println!("{}", style(format!("Result {}", position)).bold().yellow());
    println!("  File: {}", style(field("file_path")).cyan());
    println!("  Language: {}", field("language"));
    println!("  Chunk {} of {}", chunk_number, field("total_chunks"));
    println!();
    for line in result.content.lines() {
        println!("    {}", line);
    }
    println!();
}

/// Remove a file's current chunks from the index
#[inline]
pub async fn forget_file(config: &Config, file: &Path, token: &CancellationToken) -> Result<()> {
    let store = open_pipeline(config).await?;
    let root = file.parent().unwrap_or(file);
    let outcome = Indexer::new(Arc::clone(&store), root)
        .with_chunk_size(config.indexing.chunk_size)
        .remove_file(token, file)
        .await;
    let removed = close_after(store.as_ref(), outcome).await?;
    println!(
        "Removed {} chunks of {}",
        style(removed).cyan(),
        file.display()
    );
    Ok(())
}

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let embedding = &config.embedding;

    println!("{}", style("Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Embedding Settings:").bold().yellow());
    println!("  Provider: {}", style(format!("{:?}", embedding.provider)).cyan());
    println!("  Base URL: {}", style(embedding.base_url()).cyan());
    println!("  Model: {}", style(embedding.model()).cyan());
    match embedding.provider {
        ProviderKind::OpenAi => {
            let key_state = if embedding.api_key().is_ok() {
                style("set").green()
            } else {
                style("missing").red()
            };
            println!("  API Key: ${} ({})", embedding.api_key_env, key_state);
        }
        ProviderKind::Hashing => println!("  Dimension: {}", style(embedding.dimension).cyan()),
        ProviderKind::Ollama => {}
    }
    println!("  Batch Size: {}", style(embedding.batch_size).cyan());
    println!("  Timeout: {}s", style(embedding.timeout_secs).cyan());
    println!("  Retry Attempts: {}", style(embedding.retry_attempts).cyan());

    println!();
    println!("{}", style("Store Settings:").bold().yellow());
    println!("  Backend: {}", style(format!("{:?}", config.store.backend)).cyan());
    println!("  Collection: {}", style(&config.store.collection).cyan());
    println!(
        "  Location: {}",
        style(config.vector_database_path().display()).cyan()
    );

    println!();
    println!("{}", style("Indexing Settings:").bold().yellow());
    println!("  Chunk Size: {}", style(config.indexing.chunk_size).cyan());

    println!();
    println!("Config file: {}", style(config.config_file_path().display()).dim());
    Ok(())
}

/// Write the configuration file unless one already exists
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    let path = config.config_file_path();
    if path.exists() {
        println!(
            "{}",
            style(format!("Configuration already exists at {}", path.display())).yellow()
        );
        println!("Edit it directly, or run 'code-rag config --show' to inspect it.");
        return Ok(());
    }

    config.save()?;
    println!(
        "{} Wrote default configuration to {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Metadata, QueryResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose `close` always fails
    #[derive(Default)]
    struct BrokenCloseStore {
        closed: AtomicBool,
    }

    #[async_trait]
    impl VectorStore for BrokenCloseStore {
        async fn add(
            &self,
            _token: &CancellationToken,
            _documents: &[String],
            _metadatas: &[Metadata],
            _ids: &[String],
        ) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _token: &CancellationToken,
            _query_text: &str,
            _limit: usize,
        ) -> Result<QueryResult> {
            Ok(QueryResult::default())
        }

        async fn delete(&self, _token: &CancellationToken, _ids: &[String]) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Err(RagError::Store("flush failed".to_string()))
        }
    }

    #[tokio::test]
    async fn operation_error_wins_over_close_error() {
        let store = BrokenCloseStore::default();
        let outcome: Result<usize> = Err(RagError::Embedding("provider down".to_string()));

        let err = close_after(&store, outcome)
            .await
            .expect_err("failed operation should fail");

        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_error_surfaces_after_success() {
        let store = BrokenCloseStore::default();

        let err = close_after(&store, Ok(3_usize))
            .await
            .expect_err("close failure should be reported");

        assert_eq!(err.to_string(), "Vector store error: flush failed");
    }

    #[tokio::test]
    async fn successful_close_keeps_the_value() {
        let store = EmbeddedStore::new(
            "closing",
            Arc::new(HashingEmbedder::new(16)),
            MemoryCollection::new(),
        );

        let value = close_after(&store, Ok("done"))
            .await
            .expect("close should succeed");

        assert_eq!(value, "done");
        assert_eq!(store.name(), "closing");
    }
}
