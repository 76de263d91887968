// Configuration management module

pub mod settings;

pub use settings::{
    Config, ConfigError, EmbeddingConfig, IndexingConfig, ProviderKind, StoreBackend, StoreConfig,
};
