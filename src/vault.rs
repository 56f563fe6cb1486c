use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::collections::{ContextCollection, MemoryCollection, context, memory};
use crate::config::{CollectionConfig, Config};
use crate::database::ProjectDirectory;
use crate::database::lancedb::{self, SchemaManager, VectorStore};
use crate::embeddings::{EmbeddingProvider, resolve_provider};

/// Application context: configuration, both collection stores and the
/// project directory, built once per process.
#[derive(Clone)]
pub struct Vault {
    config: Config,
    memory_store: Arc<VectorStore>,
    context_store: Arc<VectorStore>,
    directory: ProjectDirectory,
}

impl Vault {
    /// Resolve the configured embedding providers, provision both collections
    /// and open the project directory.
    ///
    /// Fails fast: an unreachable model, a dimension mismatch or a stored
    /// schema conflict stops startup before any request is served.
    #[inline]
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        let memory_config = &config.collections.memory;
        let context_config = &config.collections.context;

        let memory_embedder = resolve_provider(&config.ollama, memory_config).await?;
        let context_embedder = if same_model(memory_config, context_config) {
            Arc::clone(&memory_embedder)
        } else {
            resolve_provider(&config.ollama, context_config).await?
        };

        Self::with_providers(config, memory_embedder, context_embedder).await
    }

    /// Build the context around already-resolved providers
    #[inline]
    pub async fn with_providers(
        config: Config,
        memory_embedder: Arc<dyn EmbeddingProvider>,
        context_embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let manager = SchemaManager::new(lancedb::connect(&config).await?);

        let memory_store = VectorStore::open(
            &manager,
            memory::schema(&config.collections.memory),
            memory_embedder,
        )
        .await?;
        let context_store = VectorStore::open(
            &manager,
            context::schema(&config.collections.context),
            context_embedder,
        )
        .await?;

        let directory = ProjectDirectory::open(config.directory_path()).await?;

        info!(
            "Vault ready at {} (default user '{}')",
            config.vector_uri(),
            config.identity.default_user
        );

        Ok(Self {
            config,
            memory_store: Arc::new(memory_store),
            context_store: Arc::new(context_store),
            directory,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Notes of the configured default user
    #[inline]
    pub fn memory(&self) -> MemoryCollection {
        self.memory_for(&self.config.identity.default_user)
    }

    #[inline]
    pub fn memory_for(&self, user: &str) -> MemoryCollection {
        MemoryCollection::new(Arc::clone(&self.memory_store), self.directory.clone(), user)
    }

    /// Context summaries of the configured default user
    #[inline]
    pub fn context(&self) -> ContextCollection {
        self.context_for(&self.config.identity.default_user)
    }

    #[inline]
    pub fn context_for(&self, user: &str) -> ContextCollection {
        ContextCollection::new(Arc::clone(&self.context_store), self.directory.clone(), user)
    }

    #[inline]
    pub fn directory(&self) -> &ProjectDirectory {
        &self.directory
    }

    #[inline]
    pub fn memory_store(&self) -> &Arc<VectorStore> {
        &self.memory_store
    }

    #[inline]
    pub fn context_store(&self) -> &Arc<VectorStore> {
        &self.context_store
    }
}

fn same_model(a: &CollectionConfig, b: &CollectionConfig) -> bool {
    a.provider == b.provider && a.model == b.model && a.dimension == b.dimension
}
