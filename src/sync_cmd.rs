//! `nbsync sync`: one reconciliation cycle from the command line.

use anyhow::Result;

use crate::config::Config;
use crate::library::Library;
use crate::sync::{reconcile_all, reconcile_repos};

pub async fn run_sync(config: &Config, repos: &[String], json: bool) -> Result<()> {
    let library = Library::open(config).await?;

    let actions = if repos.is_empty() {
        reconcile_all(&library).await?
    } else {
        reconcile_repos(&library, repos).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
        return Ok(());
    }

    let mut errors = 0;
    for (name, action) in &actions {
        if action.is_error() {
            errors += 1;
        }
        println!("{:<24} {:<5} {}", name, action.kind.as_str(), action.message);
    }
    println!("synced {} notebooks, {} errors", actions.len(), errors);
    Ok(())
}
