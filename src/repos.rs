//! `nbsync repos`: configured repositories and their health.

use anyhow::Result;

use crate::config::Config;
use crate::library::Library;

pub async fn list_repos(config: &Config) -> Result<()> {
    let library = Library::open(config).await?;
    let repos = library.sync_repos().await?;

    println!(
        "{:<4} {:<10} {:<8} {:<24} URL",
        "ID", "TYPE", "SYNC", "STATUS"
    );
    for repo in &repos {
        let sync = if repo.backend.two_way().is_some() {
            "two-way"
        } else {
            "one-way"
        };
        println!(
            "{:<4} {:<10} {:<8} {:<24} {}",
            repo.repo.id,
            repo.repo.repo_type,
            sync,
            health(config, repo.url()),
            repo.url()
        );
    }
    if repos.is_empty() {
        println!("(no repositories configured)");
    }

    Ok(())
}

/// Local checks only; remote repositories are not contacted.
fn health(config: &Config, url: &str) -> &'static str {
    if let Some(dir) = config.repos.directory.values().find(|d| d.url() == url) {
        return if dir.root.exists() {
            "OK"
        } else {
            "MISSING (root does not exist)"
        };
    }
    if config.repos.s3.values().any(|s| s.url() == url)
        && std::env::var("AWS_ACCESS_KEY_ID").is_err()
    {
        return "NO CREDENTIALS";
    }
    "OK"
}
