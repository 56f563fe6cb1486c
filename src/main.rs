use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vault_memory::commands::{
    SeedTarget, init_config, list_context, list_notes, list_projects, print_config, provision,
    save_context, save_note, search_context, search_notes, seed_collection, seed_users_file,
};

#[derive(Parser)]
#[command(name = "vault-memory")]
#[command(about = "Scoped semantic memory: notes and context summaries per user and project")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file, or print the current one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create or re-index both collections and migrate the project directory
    Provision,
    /// Append documents from a JSON seed file to a collection
    Seed {
        /// Collection to load into
        #[arg(value_enum)]
        target: SeedTarget,
        /// JSON array of strings or {user, project, title, content} records
        file: PathBuf,
    },
    /// Replace project directory entries from a JSON file of {id, name, projects}
    SeedUsers { file: PathBuf },
    /// Save a note
    SaveNote {
        title: String,
        content: String,
        /// Defaults to the configured user
        #[arg(long)]
        user: Option<String>,
        /// Defaults to the configured project
        #[arg(long)]
        project: Option<String>,
    },
    /// Find the notes closest in meaning to a query
    SearchNotes {
        query: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Print every note in a project, oldest first
    ListNotes {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Save a conversation summary
    SaveContext {
        title: String,
        summary: String,
        /// Key topic of the conversation; may be repeated
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Find the conversation summaries closest in meaning to a query
    SearchContext {
        query: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Print every conversation summary in a project, oldest first
    ListContext {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// List the projects a user has worked in
    Projects {
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                print_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Provision => {
            provision().await?;
        }
        Commands::Seed { target, file } => {
            seed_collection(target, &file).await?;
        }
        Commands::SeedUsers { file } => {
            seed_users_file(&file).await?;
        }
        Commands::SaveNote {
            title,
            content,
            user,
            project,
        } => {
            save_note(user, project, &title, &content).await?;
        }
        Commands::SearchNotes {
            query,
            user,
            project,
        } => {
            search_notes(user, project, &query).await?;
        }
        Commands::ListNotes { user, project } => {
            list_notes(user, project).await?;
        }
        Commands::SaveContext {
            title,
            summary,
            topics,
            user,
            project,
        } => {
            save_context(user, project, &title, &summary, topics).await?;
        }
        Commands::SearchContext {
            query,
            user,
            project,
        } => {
            search_context(user, project, &query).await?;
        }
        Commands::ListContext { user, project } => {
            list_context(user, project).await?;
        }
        Commands::Projects { user } => {
            list_projects(user).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn provision_command() {
        let cli = Cli::try_parse_from(["vault-memory", "provision"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Provision));
        }
    }

    #[test]
    fn seed_command_with_target() {
        let cli = Cli::try_parse_from(["vault-memory", "seed", "context", "context.json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Seed { target, file } = parsed.command {
                assert_eq!(target, SeedTarget::Context);
                assert_eq!(file, PathBuf::from("context.json"));
            }
        }
    }

    #[test]
    fn seed_command_rejects_unknown_target() {
        let cli = Cli::try_parse_from(["vault-memory", "seed", "profile", "profile.json"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidValue);
        }
    }

    #[test]
    fn save_note_with_scope() {
        let cli = Cli::try_parse_from([
            "vault-memory",
            "save-note",
            "Drinks",
            "likes tea",
            "--user",
            "jane",
            "--project",
            "alpha",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::SaveNote {
                title,
                content,
                user,
                project,
            } = parsed.command
            {
                assert_eq!(title, "Drinks");
                assert_eq!(content, "likes tea");
                assert_eq!(user, Some("jane".to_string()));
                assert_eq!(project, Some("alpha".to_string()));
            }
        }
    }

    #[test]
    fn save_context_with_topics() {
        let cli = Cli::try_parse_from([
            "vault-memory",
            "save-context",
            "Standup",
            "discussed blockers",
            "--topic",
            "blockers",
            "--topic",
            "release",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::SaveContext { topics, user, .. } = parsed.command {
                assert_eq!(topics, vec!["blockers".to_string(), "release".to_string()]);
                assert_eq!(user, None);
            }
        }
    }

    #[test]
    fn list_context_with_project() {
        let cli = Cli::try_parse_from(["vault-memory", "list-context", "--project", "alpha"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::ListContext { user, project } = parsed.command {
                assert_eq!(user, None);
                assert_eq!(project, Some("alpha".to_string()));
            }
        }
    }

    #[test]
    fn list_notes_rejects_positional_query() {
        let cli = Cli::try_parse_from(["vault-memory", "list-notes", "tea"]);
        assert!(cli.is_err());
    }

    #[test]
    fn projects_without_user() {
        let cli = Cli::try_parse_from(["vault-memory", "projects"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Projects { user } = parsed.command {
                assert_eq!(user, None);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["vault-memory", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["vault-memory", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["vault-memory", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
