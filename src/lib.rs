use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk error: {0}")]
    Walk(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Prefix the error message with the operation that failed, keeping its kind.
    ///
    /// Cancellation and I/O errors pass through unchanged; the latter already
    /// name the file involved.
    #[inline]
    #[must_use]
    pub fn with_context<F>(self, context: F) -> Self
    where
        F: FnOnce() -> String,
    {
        match self {
            Self::Config(msg) => Self::Config(format!("{}: {}", context(), msg)),
            Self::Walk(msg) => Self::Walk(format!("{}: {}", context(), msg)),
            Self::Embedding(msg) => Self::Embedding(format!("{}: {}", context(), msg)),
            Self::Store(msg) => Self::Store(format!("{}: {}", context(), msg)),
            Self::Other(err) => Self::Other(err.context(context())),
            err @ (Self::Cancelled | Self::Io { .. }) => err,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub mod cancel;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod search;
pub mod store;
pub mod walker;
