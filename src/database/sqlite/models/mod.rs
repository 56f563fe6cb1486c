
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;

/// A user and every project they have worked in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub projects: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// Replacement state for a user; `created_at` is assigned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub projects: BTreeSet<String>,
}

impl NewUser {
    #[inline]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            projects: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn with_project(mut self, project: &str) -> Self {
        self.projects.insert(project.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    #[inline]
    pub fn into_record(self, projects: BTreeSet<String>) -> UserRecord {
        UserRecord {
            id: self.id,
            name: self.name,
            projects,
            created_at: self.created_at,
        }
    }
}
