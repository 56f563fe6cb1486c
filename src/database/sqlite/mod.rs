use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::VaultError;
use crate::database::sqlite::models::{NewUser, UserRecord};
use crate::database::sqlite::queries::UserQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Which projects each user has worked in
#[derive(Debug, Clone)]
pub struct ProjectDirectory {
    pool: DbPool,
}

impl ProjectDirectory {
    /// Open (creating if needed) the directory database at `path` and migrate it
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, VaultError> {
        Self::connect(path.as_ref())
            .await
            .map_err(|e| VaultError::StorageUnavailable(format!("{:#}", e)))
    }

    async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let directory = Self { pool };
        directory.run_migrations().await?;

        Ok(directory)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        info!("Running project directory migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Project directory migrations completed");
        Ok(())
    }

    /// Projects `user_id` has used; empty when the user is unknown
    #[inline]
    pub async fn get_projects(&self, user_id: &str) -> Result<BTreeSet<String>, VaultError> {
        UserQueries::get_projects(&self.pool, user_id)
            .await
            .map_err(storage_error)
    }

    #[inline]
    pub async fn record_usage(&self, user_id: &str, project: &str) -> Result<(), VaultError> {
        UserQueries::record_usage(&self.pool, user_id, project)
            .await
            .map_err(storage_error)
    }

    #[inline]
    pub async fn upsert_user(&self, user: &NewUser) -> Result<UserRecord, VaultError> {
        let record = UserQueries::upsert(&self.pool, user)
            .await
            .map_err(storage_error)?;
        debug!(
            "Upserted user {} with {} projects",
            record.id,
            record.projects.len()
        );
        Ok(record)
    }

    #[inline]
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, VaultError> {
        UserQueries::get(&self.pool, user_id)
            .await
            .map_err(storage_error)
    }

    #[inline]
    pub async fn list_users(&self) -> Result<Vec<UserRecord>, VaultError> {
        UserQueries::list(&self.pool).await.map_err(storage_error)
    }
}

fn storage_error(err: anyhow::Error) -> VaultError {
    VaultError::StorageUnavailable(format!("{:#}", err))
}
