// Collections module
// Domain adapters mapping notes and context summaries onto scoped documents

pub mod context;
pub mod memory;

use async_trait::async_trait;

use crate::Result;

pub use context::{ContextCollection, ContextDraft, ContextSummary};
pub use memory::{MemoryCollection, Note, NoteDraft};

/// Results returned by a collection search
pub const SEARCH_LIMIT: usize = 3;

/// Save and search one domain type within a user's projects.
///
/// Implementations hold no state of their own beyond the user they act for;
/// documents live in the underlying vector store.
#[async_trait]
pub trait Collection: Send + Sync {
    type Draft: Send;
    type Item: Send;

    /// Store `draft` under `project`, recording the project for the user
    async fn save(&self, project: &str, draft: Self::Draft) -> Result<Self::Item>;

    /// Closest items to `query` in `project`, at most [`SEARCH_LIMIT`]
    async fn search(&self, project: &str, query: &str) -> Result<Vec<Self::Item>>;

    /// Every item in `project`, oldest first
    async fn list(&self, project: &str) -> Result<Vec<Self::Item>>;
}
