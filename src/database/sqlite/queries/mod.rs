
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::debug;

pub struct UserQueries;

impl UserQueries {
    #[inline]
    pub async fn get_projects(pool: &SqlitePool, user_id: &str) -> Result<BTreeSet<String>> {
        let projects: Vec<String> = sqlx::query_scalar(
            "SELECT project FROM user_projects WHERE user_id = ? ORDER BY project",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to get projects for user {}", user_id))?;

        Ok(projects.into_iter().collect())
    }

    /// Create the user on first sight and add `project` to their set
    #[inline]
    pub async fn record_usage(pool: &SqlitePool, user_id: &str, project: &str) -> Result<()> {
        let created = sqlx::query(
            "INSERT INTO users (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to ensure user exists")?
        .rows_affected();

        if created > 0 {
            debug!("Created directory entry for user {}", user_id);
        }

        sqlx::query(
            "INSERT INTO user_projects (user_id, project) VALUES (?, ?) ON CONFLICT (user_id, project) DO NOTHING",
        )
        .bind(user_id)
        .bind(project)
        .execute(pool)
        .await
        .context("Failed to record project usage")?;

        Ok(())
    }

    /// Replace name and projects, keeping the original `created_at`
    #[inline]
    pub async fn upsert(pool: &SqlitePool, user: &NewUser) -> Result<UserRecord> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, created_at) VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(Utc::now())
        .execute(&mut *transaction)
        .await
        .context("Failed to upsert user")?;

        sqlx::query("DELETE FROM user_projects WHERE user_id = ?")
            .bind(&user.id)
            .execute(&mut *transaction)
            .await
            .context("Failed to clear user projects")?;

        for project in &user.projects {
            sqlx::query("INSERT INTO user_projects (user_id, project) VALUES (?, ?)")
                .bind(&user.id)
                .bind(project)
                .execute(&mut *transaction)
                .await
                .with_context(|| format!("Failed to add project {}", project))?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit user upsert")?;

        Self::get(pool, &user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted user {}", user.id))
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, user_id: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by id")?;

        match row {
            Some(row) => {
                let projects = Self::get_projects(pool, &row.id).await?;
                Ok(Some(row.into_record(projects)))
            }
            None => Ok(None),
        }
    }

    #[inline]
    pub async fn list(pool: &SqlitePool) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at FROM users ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let projects = Self::get_projects(pool, &row.id).await?;
            users.push(row.into_record(projects));
        }

        Ok(users)
    }
}
