
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{Collection, SEARCH_LIMIT};
use crate::Result;
use crate::config::CollectionConfig;
use crate::database::ProjectDirectory;
use crate::database::lancedb::{CollectionSchema, Document, NewDocument, VectorStore};

pub const KEY_TOPICS_FIELD: &str = "key_topics";

/// Title reported for bodies that lack the `"{title}: "` prefix
pub const PLACEHOLDER_TITLE: &str = "Untitled context";

const TITLE_SEPARATOR: &str = ": ";

#[inline]
pub fn schema(config: &CollectionConfig) -> CollectionSchema {
    CollectionSchema::scoped(
        &config.name,
        &config.prefix,
        config.vector_attrs(),
        &[KEY_TOPICS_FIELD],
    )
}

/// Stored body of a context summary
#[inline]
pub fn canonical_body(title: &str, summary: &str) -> String {
    format!("{}{}{}", title, TITLE_SEPARATOR, summary)
}

/// Split a stored body back into `(title, summary)` at the first `": "`
#[inline]
pub fn split_body(body: &str) -> (String, String) {
    match body.split_once(TITLE_SEPARATOR) {
        Some((title, summary)) => (title.to_string(), summary.to_string()),
        None => (PLACEHOLDER_TITLE.to_string(), body.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDraft {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
}

impl ContextDraft {
    #[inline]
    pub fn new(title: &str, summary: &str) -> Self {
        Self {
            title: title.to_string(),
            summary: summary.to_string(),
            key_topics: Vec::new(),
        }
    }

    #[inline]
    pub fn with_key_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Document holding the canonical body, with key topics stored as a JSON
    /// array so a topic may itself contain commas
    #[inline]
    pub fn to_document(&self, user: &str, project: &str) -> NewDocument {
        let document = NewDocument::new(user, project, &canonical_body(&self.title, &self.summary));
        let topics = clean_topics(&self.key_topics);
        if topics.is_empty() {
            return document;
        }

        // A list of strings always serialises
        let encoded = serde_json::to_string(&topics).unwrap_or_default();
        document.with_attribute(KEY_TOPICS_FIELD, &encoded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub key_topics: Vec<String>,
}

impl From<Document> for ContextSummary {
    #[inline]
    fn from(document: Document) -> Self {
        let (title, summary) = split_body(&document.content);
        let key_topics = document
            .attribute(KEY_TOPICS_FIELD)
            .map(parse_topics)
            .unwrap_or_default();

        Self {
            id: document.id,
            title,
            summary,
            key_topics,
        }
    }
}

fn clean_topics(topics: &[String]) -> Vec<&str> {
    topics
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Decode a stored topic list; rows seeded by hand may hold a plain
/// comma-separated string instead of a JSON array
fn parse_topics(stored: &str) -> Vec<String> {
    if let Ok(topics) = serde_json::from_str::<Vec<String>>(stored) {
        return topics;
    }

    stored
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Conversation summaries for one user, searched by meaning
#[derive(Clone)]
pub struct ContextCollection {
    store: Arc<VectorStore>,
    directory: ProjectDirectory,
    user: String,
}

impl ContextCollection {
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
    pub async fn save_context(
        &self,
        project: &str,
        title: &str,
        summary: &str,
    ) -> Result<ContextSummary> {
        self.save(project, ContextDraft::new(title, summary)).await
    }
}

#[async_trait]
impl Collection for ContextCollection {
    type Draft = ContextDraft;
    type Item = ContextSummary;

    async fn save(&self, project: &str, draft: ContextDraft) -> Result<ContextSummary> {
        let document = self
            .store
            .add_document(draft.to_document(&self.user, project))
            .await?;

        // Only a stored summary lists its project
        self.directory.record_usage(&self.user, project).await?;

        debug!(
            "Saved context {} for {} in {}",
            document.id, self.user, project
        );

        // The stored body splits at the first ": ", which may lie inside the title
        Ok(ContextSummary {
            id: document.id,
            key_topics: clean_topics(&draft.key_topics)
                .into_iter()
                .map(str::to_string)
                .collect(),
            title: draft.title,
            summary: draft.summary,
        })
    }

    async fn search(&self, project: &str, query: &str) -> Result<Vec<ContextSummary>> {
        let hits = self
            .store
            .query(&self.user, project, query, SEARCH_LIMIT)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| ContextSummary::from(hit.document))
            .collect())
    }

    async fn list(&self, project: &str) -> Result<Vec<ContextSummary>> {
        let documents = self
            .store
            .list(&self.store.scope_filter(&self.user, project))
            .await?;

        Ok(documents.into_iter().map(ContextSummary::from).collect())
    }
}
