use anyhow::{Context, Result};
use clap::ValueEnum;
use console::style;
use std::path::Path;
use tracing::info;

use crate::Vault;
use crate::collections::{Collection, ContextDraft};
use crate::config::{Config, show_config};
use crate::database::lancedb::{NewDocument, TagFilter};
use crate::seed::{self, SeedDefaults};

/// Collection a seed file is loaded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeedTarget {
    Memory,
    Context,
}

async fn open_vault() -> Result<Vault> {
    let config = Config::load_default()?;
    Vault::initialize(config)
        .await
        .context("Failed to initialize vault")
}

/// Print the effective configuration
#[inline]
pub fn print_config() -> Result<()> {
    let config = Config::load_default()?;
    print!("{}", show_config(&config)?);
    Ok(())
}

/// Write a default configuration file unless one exists
#[inline]
pub fn init_config() -> Result<()> {
    let config = Config::load_default()?;
    let path = config.config_file_path();

    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }

    config.save()?;
    println!(
        "{} Wrote default configuration to {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

/// Provision both collections and report their document counts
#[inline]
pub async fn provision() -> Result<()> {
    let vault = open_vault().await?;

    for store in [vault.memory_store(), vault.context_store()] {
        let count = store
            .count(&TagFilter::new())
            .await
            .context("Failed to count documents")?;
        println!(
            "{} {} ({}): {} documents",
            style("✓").green(),
            store.schema().name,
            store.schema().prefix,
            count
        );
    }

    let users = vault.directory().list_users().await?;
    println!("Project directory: {} users", users.len());
    Ok(())
}

/// Append the entries of a seed file to a collection
#[inline]
pub async fn seed_collection(target: SeedTarget, path: &Path) -> Result<()> {
    let vault = open_vault().await?;
    let entries = seed::load_seed_file(path)?;
    let identity = &vault.config().identity;
    let defaults = SeedDefaults {
        user: identity.default_user.clone(),
        project: identity.default_project.clone(),
    };

    let (store, documents): (_, Vec<NewDocument>) = match target {
        SeedTarget::Memory => (
            vault.memory_store(),
            entries
                .iter()
                .map(|e| e.to_memory_document(&defaults))
                .collect(),
        ),
        SeedTarget::Context => (
            vault.context_store(),
            entries
                .iter()
                .map(|e| e.to_context_document(&defaults))
                .collect(),
        ),
    };

    let stored = seed::seed_store(store, vault.directory(), documents).await?;
    println!(
        "{} Seeded {} documents from {}",
        style("✓").green(),
        stored,
        path.display()
    );
    Ok(())
}

/// Replace directory entries from a user seed file
#[inline]
pub async fn seed_users_file(path: &Path) -> Result<()> {
    let vault = open_vault().await?;
    let users = seed::load_user_seed_file(path)?;
    let count = seed::seed_users(vault.directory(), &users).await?;
    println!("{} Seeded {} users", style("✓").green(), count);
    Ok(())
}

#[inline]
pub async fn save_note(
    user: Option<String>,
    project: Option<String>,
    title: &str,
    content: &str,
) -> Result<()> {
    let vault = open_vault().await?;
    let (user, project) = scope(&vault, user, project);

    let note = vault.memory_for(&user).save_note(&project, title, content).await?;
    info!("Saved note {} for {} in {}", note.id, user, project);
    println!("{}", note.id);
    Ok(())
}

#[inline]
pub async fn search_notes(user: Option<String>, project: Option<String>, query: &str) -> Result<()> {
    let vault = open_vault().await?;
    let (user, project) = scope(&vault, user, project);

    let notes = vault.memory_for(&user).search(&project, query).await?;
    if notes.is_empty() {
        println!("No notes found for {} in {}", user, project);
        return Ok(());
    }

    for note in notes {
        if note.title.is_empty() {
            println!("{}", style(&note.id).dim());
        } else {
            println!("{} {}", style(&note.title).bold(), style(&note.id).dim());
        }
        println!("   {}", note.content);
    }
    Ok(())
}

#[inline]
pub async fn save_context(
    user: Option<String>,
    project: Option<String>,
    title: &str,
    summary: &str,
    key_topics: Vec<String>,
) -> Result<()> {
    let vault = open_vault().await?;
    let (user, project) = scope(&vault, user, project);

    let draft = ContextDraft::new(title, summary).with_key_topics(key_topics);
    let saved = vault.context_for(&user).save(&project, draft).await?;
    info!("Saved context {} for {} in {}", saved.id, user, project);
    println!("{}", saved.id);
    Ok(())
}

#[inline]
pub async fn search_context(
    user: Option<String>,
    project: Option<String>,
    query: &str,
) -> Result<()> {
    let vault = open_vault().await?;
    let (user, project) = scope(&vault, user, project);

    let summaries = vault.context_for(&user).search(&project, query).await?;
    if summaries.is_empty() {
        println!("No context found for {} in {}", user, project);
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{} {}",
            style(&summary.title).bold(),
            style(&summary.id).dim()
        );
        println!("   {}", summary.summary);
        if !summary.key_topics.is_empty() {
            println!("   Topics: {}", summary.key_topics.join("; "));
        }
    }
    Ok(())
}

/// Print every note in a project, oldest first
#[inline]
pub async fn list_notes(user: Option<String>, project: Option<String>) -> Result<()> {
    let vault = open_vault().await?;
    let (user, project) = scope(&vault, user, project);

    let notes = vault.memory_for(&user).list(&project).await?;
    if notes.is_empty() {
        println!("No notes recorded for {} in {}", user, project);
        return Ok(());
    }

    println!("Notes for {} in {} ({} total):", user, project, notes.len());
    for note in notes {
        if note.title.is_empty() {
            println!("{}", style(&note.id).dim());
        } else {
            println!("{} {}", style(&note.title).bold(), style(&note.id).dim());
        }
        println!("   {}", note.content);
    }
    Ok(())
}

/// Print every context summary in a project, oldest first
#[inline]
pub async fn list_context(user: Option<String>, project: Option<String>) -> Result<()> {
    let vault = open_vault().await?;
    let (user, project) = scope(&vault, user, project);

    let summaries = vault.context_for(&user).list(&project).await?;
    if summaries.is_empty() {
        println!("No context recorded for {} in {}", user, project);
        return Ok(());
    }

    println!(
        "Context for {} in {} ({} total):",
        user,
        project,
        summaries.len()
    );
    for summary in summaries {
        println!(
            "{} {}",
            style(&summary.title).bold(),
            style(&summary.id).dim()
        );
        println!("   {}", summary.summary);
        if !summary.key_topics.is_empty() {
            println!("   Topics: {}", summary.key_topics.join("; "));
        }
    }
    Ok(())
}

/// List the projects a user has worked in
#[inline]
pub async fn list_projects(user: Option<String>) -> Result<()> {
    let vault = open_vault().await?;
    let user = user.unwrap_or_else(|| vault.config().identity.default_user.clone());

    let projects = vault.directory().get_projects(&user).await?;
    if projects.is_empty() {
        println!("No projects recorded for {}", user);
        return Ok(());
    }

    println!("Projects for {} ({} total):", user, projects.len());
    for project in projects {
        println!("  {}", project);
    }
    Ok(())
}

fn scope(vault: &Vault, user: Option<String>, project: Option<String>) -> (String, String) {
    let identity = &vault.config().identity;
    (
        user.unwrap_or_else(|| identity.default_user.clone()),
        project.unwrap_or_else(|| identity.default_project.clone()),
    )
}
