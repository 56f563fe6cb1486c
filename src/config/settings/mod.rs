
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::database::lancedb::schema::{
    DistanceMetric, IndexAlgorithm, NumericType, VectorAttrs,
};
use crate::embeddings::ollama::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL};

pub const HOME_ENV: &str = "VAULT_HOME";
pub const USER_ENV: &str = "VAULT_USER";
pub const VECTOR_URI_ENV: &str = "VAULT_VECTOR_URI";
pub const OLLAMA_HOST_ENV: &str = "VAULT_OLLAMA_HOST";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// LanceDB URI; a local directory under the base dir when unset
    pub vector_uri: Option<String>,
    /// SQLite file for the project directory
    pub directory_path: Option<PathBuf>,
    /// Passed through to the object store (credentials, region, endpoint)
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub default_user: String,
    pub default_project: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_user: "default".to_string(),
            default_project: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            batch_size: 16,
            timeout_seconds: 30,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Ollama,
    /// Deterministic token hashing, no model server required
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionsConfig {
    pub memory: CollectionConfig,
    pub context: CollectionConfig,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            memory: CollectionConfig::named("memory"),
            context: CollectionConfig::named("context"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionConfig {
    pub name: String,
    pub prefix: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: u32,
    #[serde(default)]
    pub numeric_type: NumericType,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default)]
    pub algorithm: IndexAlgorithm,
}

fn default_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

impl CollectionConfig {
    /// Defaults for a collection called `name`, stored under `user_{name}`
    #[inline]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: format!("user_{}", name),
            provider: ProviderKind::default(),
            model: default_model(),
            dimension: default_dimension(),
            numeric_type: NumericType::default(),
            distance_metric: DistanceMetric::default(),
            algorithm: IndexAlgorithm::default(),
        }
    }

    #[inline]
    pub fn vector_attrs(&self) -> VectorAttrs {
        VectorAttrs {
            dimension: self.dimension as usize,
            distance_metric: self.distance_metric,
            algorithm: self.algorithm,
            numeric_type: self.numeric_type,
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyValue("collection name".to_string()));
        }
        if self.prefix.trim().is_empty() {
            return Err(ConfigError::EmptyValue(format!(
                "prefix of collection '{}'",
                self.name
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid {0}: cannot be empty")]
    EmptyValue(String),
    #[error("Collections '{0}' and '{1}' share the key prefix '{2}'")]
    SharedPrefix(String, String, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// `$VAULT_HOME`, falling back to `~/.vault-memory`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|home| home.join(".vault-memory"))
            .or_else(|| dirs::data_dir().map(|data| data.join("vault-memory")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Defaults rooted at `base_dir`, without reading any file
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load from the default directory and apply environment overrides
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        let mut config = Self::load(&config_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Apply `VAULT_*` overrides from `lookup`
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(USER_ENV).filter(|v| !v.trim().is_empty()) {
            self.identity.default_user = user;
        }
        if let Some(uri) = lookup(VECTOR_URI_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage.vector_uri = Some(uri);
        }
        if let Some(host) = lookup(OLLAMA_HOST_ENV).filter(|v| !v.trim().is_empty()) {
            self.ollama.host = host;
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        if self.identity.default_user.trim().is_empty() {
            return Err(ConfigError::EmptyValue("default user".to_string()));
        }
        if self.identity.default_project.trim().is_empty() {
            return Err(ConfigError::EmptyValue("default project".to_string()));
        }

        let memory = &self.collections.memory;
        let context = &self.collections.context;
        memory.validate()?;
        context.validate()?;

        if memory.prefix == context.prefix {
            return Err(ConfigError::SharedPrefix(
                memory.name.clone(),
                context.name.clone(),
                memory.prefix.clone(),
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// LanceDB URI for the vector collections
    #[inline]
    pub fn vector_uri(&self) -> String {
        self.storage.vector_uri.clone().unwrap_or_else(|| {
            self.get_base_dir()
                .join("vectors")
                .to_string_lossy()
                .into_owned()
        })
    }

    /// Path for the project directory SQLite database
    #[inline]
    pub fn directory_path(&self) -> PathBuf {
        self.storage
            .directory_path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("directory.db"))
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
