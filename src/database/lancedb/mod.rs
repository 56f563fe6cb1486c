// LanceDB vector database module
// Collection schemas, provisioning, and scoped similarity search over documents


pub mod filter;
pub mod schema;
pub mod vector_store;

use lancedb::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::VaultError;
use crate::config::Config;

pub use filter::TagFilter;
pub use schema::{CollectionSchema, SchemaManager};
pub use vector_store::VectorStore;

/// Project used by collections that are not partitioned by project
pub const DEFAULT_PROJECT: &str = "default";

/// A document about to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub user: String,
    pub project: String,
    pub content: String,
    /// Values for the schema's additional text fields, keyed by field name
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NewDocument {
    #[inline]
    pub fn new(user: &str, project: &str, content: &str) -> Self {
        Self {
            user: user.to_string(),
            project: project.to_string(),
            content: content.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn with_attribute(mut self, field: &str, value: &str) -> Self {
        self.attributes.insert(field.to_string(), value.to_string());
        self
    }
}

/// A stored document, without its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user: String,
    pub project: String,
    pub content: String,
    pub attributes: BTreeMap<String, String>,
    pub inserted_at: i64,
}

impl Document {
    #[inline]
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).map(String::as_str)
    }
}

/// Search hit; smaller distance means more similar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f32,
}

impl ScoredDocument {
    /// Cosine similarity for cosine-distance collections
    #[inline]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Open the LanceDB database configured in `config`.
///
/// Reads are consistent with every acknowledged write.
#[inline]
pub async fn connect(config: &Config) -> Result<Connection, VaultError> {
    let uri = config.vector_uri();
    debug!("Connecting to LanceDB at {}", uri);

    if !uri.contains("://") {
        std::fs::create_dir_all(&uri).map_err(|e| {
            VaultError::StorageUnavailable(format!(
                "Failed to create vector database directory: {}",
                e
            ))
        })?;
    }

    let mut builder = lancedb::connect(&uri).read_consistency_interval(Duration::ZERO);
    if !config.storage.options.is_empty() {
        builder = builder.storage_options(
            config
                .storage
                .options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    builder
        .execute()
        .await
        .map_err(|e| VaultError::StorageUnavailable(format!("Failed to connect to LanceDB: {}", e)))
}
