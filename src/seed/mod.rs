// Seed module
// Bulk loading of notes, context summaries and users from JSON files


use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::collections::context::ContextDraft;
use crate::collections::memory::TITLE_FIELD;
use crate::database::ProjectDirectory;
use crate::database::lancedb::{NewDocument, VectorStore};
use crate::database::sqlite::models::NewUser;
use crate::{Result, VaultError};

/// Documents embedded and written per store append
pub const SEED_BATCH_SIZE: usize = 64;

/// One element of a seed file: a bare string, or a record overriding the
/// default user and project
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SeedEntry {
    Text(String),
    Record {
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        project: Option<String>,
        #[serde(default)]
        title: Option<String>,
        content: String,
    },
}

/// Partition used for entries that do not name one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedDefaults {
    pub user: String,
    pub project: String,
}

impl SeedEntry {
    fn parts<'a>(&'a self, defaults: &'a SeedDefaults) -> (&'a str, &'a str, Option<&'a str>, &'a str) {
        match self {
            Self::Text(content) => (
                defaults.user.as_str(),
                defaults.project.as_str(),
                None,
                content.as_str(),
            ),
            Self::Record {
                user,
                project,
                title,
                content,
            } => (
                user.as_deref().unwrap_or(&defaults.user),
                project.as_deref().unwrap_or(&defaults.project),
                title.as_deref(),
                content.as_str(),
            ),
        }
    }

    /// Note document; the title, when present, is kept as an attribute
    #[inline]
    pub fn to_memory_document(&self, defaults: &SeedDefaults) -> NewDocument {
        let (user, project, title, content) = self.parts(defaults);
        let document = NewDocument::new(user, project, content);
        match title {
            Some(title) => document.with_attribute(TITLE_FIELD, title),
            None => document,
        }
    }

    /// Context document; a titled entry is stored as `"{title}: {content}"`
    #[inline]
    pub fn to_context_document(&self, defaults: &SeedDefaults) -> NewDocument {
        let (user, project, title, content) = self.parts(defaults);
        match title {
            Some(title) => ContextDraft::new(title, content).to_document(user, project),
            None => NewDocument::new(user, project, content),
        }
    }
}

#[inline]
pub fn load_seed_file<P: AsRef<Path>>(path: P) -> Result<Vec<SeedEntry>> {
    read_json(path.as_ref())
}

#[inline]
pub fn load_user_seed_file<P: AsRef<Path>>(path: P) -> Result<Vec<NewUser>> {
    read_json(path.as_ref())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;

    serde_json::from_str(&content).map_err(|e| {
        VaultError::Configuration(format!("Invalid seed file {}: {}", path.display(), e))
    })
}

/// Append `documents` to `store`, then record every partition they touch.
///
/// Seeding appends: running it twice stores every document twice.
#[inline]
pub async fn seed_store(
    store: &VectorStore,
    directory: &ProjectDirectory,
    documents: Vec<NewDocument>,
) -> Result<usize> {
    let total = documents.len();
    info!(
        "Seeding {} documents into '{}'",
        total,
        store.schema().name
    );

    let partitions: BTreeSet<(String, String)> = documents
        .iter()
        .map(|d| (d.user.clone(), d.project.clone()))
        .collect();

    let bar = progress_bar(total as u64, &store.schema().name);

    let mut remaining = documents;
    let mut stored = 0;
    while !remaining.is_empty() {
        let rest = remaining.split_off(SEED_BATCH_SIZE.min(remaining.len()));
        stored += store.add_batch(remaining).await?.len();
        bar.set_position(stored as u64);
        remaining = rest;
    }

    bar.finish_and_clear();

    for (user, project) in &partitions {
        directory.record_usage(user, project).await?;
    }
    info!(
        "Seeded {} documents across {} partitions",
        stored,
        partitions.len()
    );
    Ok(stored)
}

/// Replace each listed user's directory entry
#[inline]
pub async fn seed_users(directory: &ProjectDirectory, users: &[NewUser]) -> Result<usize> {
    for user in users {
        let record = directory.upsert_user(user).await?;
        debug!(
            "Seeded user {} with projects {:?}",
            record.id, record.projects
        );
    }

    info!("Seeded {} users", users.len());
    Ok(users.len())
}

fn progress_bar(length: u64, collection: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Seeding {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(length).with_style(style);
    bar.set_message(collection.to_string());
    bar
}
