use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema conflict in collection '{collection}': {reason}")]
    SchemaConflict { collection: String, reason: String },

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Whether the caller may retry the failed operation as-is.
    ///
    /// Only transient storage failures qualify; every other variant needs an
    /// operator decision (fix configuration, re-seed, restore the model).
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<config::ConfigError> for VaultError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub mod collections;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod seed;
pub mod vault;

pub use vault::Vault;
