//! # notebook-sync CLI (`nbsync`)
//!
//! ## Usage
//!
//! ```bash
//! nbsync --config ./config/nbsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nbsync init` | Create the database and register configured repositories |
//! | `nbsync repos` | List repositories and their health |
//! | `nbsync notebooks` | List local notebooks with link and last action |
//! | `nbsync add <name>` | Add a local notebook |
//! | `nbsync edit <name> --file <path>` | Replace a notebook's content |
//! | `nbsync link <name> <url\|none>` | Link a notebook to a repository |
//! | `nbsync sync` | Run one sync cycle |
//!
//! Logging goes to stderr and is controlled by `NBSYNC_LOG` or `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notebook_sync::{config, library::Library, notebooks, repos, sync_cmd};

/// Keeps local notebooks in sync with directory, Git and S3 repositories.
#[derive(Parser)]
#[command(name = "nbsync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nbsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and register configured repositories.
    ///
    /// Idempotent.
    Init,

    /// List configured repositories.
    Repos,

    /// List local notebooks.
    Notebooks,

    /// Add a local notebook.
    Add {
        /// Notebook name, e.g. `todo` or `journal/2024`.
        name: String,

        /// Initial content. Empty when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Replace a notebook's content and mark it modified.
    Edit {
        name: String,

        #[arg(long)]
        file: PathBuf,
    },

    /// Link a notebook to a repository url, or `none` to unlink.
    Link { name: String, repo: String },

    /// Run one sync cycle.
    Sync {
        /// Restrict the cycle to these repository urls. Repeatable.
        #[arg(long = "repo")]
        repos: Vec<String>,

        /// Print the per-notebook actions as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("NBSYNC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("notebook_sync=warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let library = Library::open(&cfg).await?;
            let registered = library.repos().await?;
            println!(
                "Database initialized successfully ({} repositories registered).",
                registered.len()
            );
        }
        Commands::Repos => {
            repos::list_repos(&cfg).await?;
        }
        Commands::Notebooks => {
            notebooks::list_notebooks(&cfg).await?;
        }
        Commands::Add { name, file } => {
            notebooks::add_notebook(&cfg, &name, file.as_deref()).await?;
        }
        Commands::Edit { name, file } => {
            notebooks::edit_notebook(&cfg, &name, &file).await?;
        }
        Commands::Link { name, repo } => {
            notebooks::link_notebook(&cfg, &name, &repo).await?;
        }
        Commands::Sync { repos, json } => {
            sync_cmd::run_sync(&cfg, &repos, json).await?;
        }
    }

    Ok(())
}
