// Embeddings module
// Text to vector conversion behind a provider trait, resolved once at startup

pub mod hashing;
pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{CollectionConfig, OllamaConfig, ProviderKind};
use crate::{Result, VaultError};

pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// A pure text -> vector function for one model.
///
/// The same text under the same model always yields the same vector, and every
/// vector has exactly `dimension()` components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Build the provider a collection is configured with and prove it works.
///
/// Any failure to reach or invoke the model is `EmbeddingUnavailable`; a model
/// that answers with the wrong dimensionality is a configuration error.
#[inline]
pub async fn resolve_provider(
    ollama: &OllamaConfig,
    collection: &CollectionConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match collection.provider {
        ProviderKind::Hashing => Arc::new(HashingEmbedder::new(collection.dimension as usize)),
        ProviderKind::Ollama => {
            let client = OllamaClient::new(ollama, &collection.model, collection.dimension as usize)
                .map_err(|e| VaultError::Configuration(format!("{:#}", e)))?;

            let probe = client.clone();
            tokio::task::spawn_blocking(move || probe.health_check())
                .await
                .map_err(|e| VaultError::EmbeddingUnavailable(e.to_string()))?
                .map_err(|e| VaultError::EmbeddingUnavailable(format!("{:#}", e)))?;

            Arc::new(client)
        }
    };

    verify_dimension(provider.as_ref(), collection.dimension as usize).await?;

    info!(
        "Embedding provider '{}' ready for collection '{}' ({} dimensions)",
        provider.model_id(),
        collection.name,
        provider.dimension()
    );
    Ok(provider)
}

/// Embed a probe sentence and compare its length with `expected`
#[inline]
pub async fn verify_dimension(provider: &dyn EmbeddingProvider, expected: usize) -> Result<()> {
    let probe = provider.embed("dimension probe").await?;
    debug!(
        "Model '{}' produced {} dimensions",
        provider.model_id(),
        probe.len()
    );

    if probe.len() != expected {
        return Err(VaultError::Configuration(format!(
            "model '{}' produces {}-dimensional embeddings but {} are configured",
            provider.model_id(),
            probe.len(),
            expected
        )));
    }

    Ok(())
}
