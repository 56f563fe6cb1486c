
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{Collection, SEARCH_LIMIT};
use crate::Result;
use crate::config::CollectionConfig;
use crate::database::ProjectDirectory;
use crate::database::lancedb::{CollectionSchema, Document, NewDocument, VectorStore};

pub const TITLE_FIELD: &str = "title";

/// Schema of the note collection: the scoped layout plus a `title` text field
#[inline]
pub fn schema(config: &CollectionConfig) -> CollectionSchema {
    CollectionSchema::scoped(
        &config.name,
        &config.prefix,
        config.vector_attrs(),
        &[TITLE_FIELD],
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

impl NoteDraft {
    #[inline]
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
}

impl From<Document> for Note {
    #[inline]
    fn from(document: Document) -> Self {
        Self {
            // Rows written without a title read back with an empty one
            title: document.attribute(TITLE_FIELD).unwrap_or_default().to_string(),
            id: document.id,
            content: document.content,
        }
    }
}

/// Free-form notes for one user, searched by meaning
#[derive(Clone)]
pub struct MemoryCollection {
    store: Arc<VectorStore>,
    directory: ProjectDirectory,
    user: String,
}

impl MemoryCollection {
    #[inline]
    pub fn new(store: Arc<VectorStore>, directory: ProjectDirectory, user: &str) -> Self {
        Self {
            store,
            directory,
            user: user.to_string(),
        }
    }

    #[inline]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[inline]
    pub async fn save_note(&self, project: &str, title: &str, content: &str) -> Result<Note> {
        self.save(project, NoteDraft::new(title, content)).await
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    type Draft = NoteDraft;
    type Item = Note;

    async fn save(&self, project: &str, draft: NoteDraft) -> Result<Note> {
        let document = self
            .store
            .add_document(
                NewDocument::new(&self.user, project, &draft.content)
                    .with_attribute(TITLE_FIELD, &draft.title),
            )
            .await?;

        // Only a stored note lists its project
        self.directory.record_usage(&self.user, project).await?;

        debug!("Saved note {} for {} in {}", document.id, self.user, project);
        Ok(Note::from(document))
    }

    async fn search(&self, project: &str, query: &str) -> Result<Vec<Note>> {
        let hits = self
            .store
            .query(&self.user, project, query, SEARCH_LIMIT)
            .await?;

        Ok(hits.into_iter().map(|hit| Note::from(hit.document)).collect())
    }

    async fn list(&self, project: &str) -> Result<Vec<Note>> {
        let documents = self
            .store
            .list(&self.store.scope_filter(&self.user, project))
            .await?;

        Ok(documents.into_iter().map(Note::from).collect())
    }
}
