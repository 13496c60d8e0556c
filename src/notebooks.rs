//! Notebook commands: `notebooks`, `add`, `edit` and `link`.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::error::SyncError;
use crate::library::Library;
use crate::models::BookView;

pub async fn list_notebooks(config: &Config) -> Result<()> {
    let library = Library::open(config).await?;
    let books = library.books().await?;

    println!("{:<24} {:<6} {:<40} LAST ACTION", "NAME", "FLAGS", "LINK");
    for view in &books {
        let link = view
            .link_repo
            .as_ref()
            .map(|r| r.url.as_str())
            .unwrap_or("-");
        let last = view
            .book
            .last_action
            .as_ref()
            .map(|a| format!("[{}] {}", a.kind.as_str(), a.message))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<24} {:<6} {:<40} {}", view.book.name, flags(view), link, last);
    }
    if books.is_empty() {
        println!("(no notebooks)");
    }
    Ok(())
}

/// `M` modified, `D` placeholder, `S` has a synced revision.
fn flags(view: &BookView) -> String {
    let mut flags = String::new();
    if view.is_modified() {
        flags.push('M');
    }
    if view.is_dummy() {
        flags.push('D');
    }
    if view.has_sync() {
        flags.push('S');
    }
    if flags.is_empty() {
        flags.push('-');
    }
    flags
}

fn read_content(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(String::new()),
    }
}

pub async fn add_notebook(config: &Config, name: &str, file: Option<&Path>) -> Result<()> {
    let name = name.trim().trim_matches('/');
    if name.is_empty() {
        bail!("Notebook name must not be empty");
    }
    let library = Library::open(config).await?;
    if library.book_by_name(name).await?.is_some() {
        bail!("Notebook '{}' already exists", name);
    }
    let content = read_content(file)?;
    let view = library.create_book(name, &content).await?;
    // New notebooks carry content nobody has pushed yet.
    library.store().set_modified(view.book.id, true).await?;
    println!("added {}", name);
    Ok(())
}

pub async fn edit_notebook(config: &Config, name: &str, file: &Path) -> Result<()> {
    let library = Library::open(config).await?;
    let Some(view) = library.book_by_name(name).await? else {
        bail!("Notebook '{}' not found", name);
    };
    let content = read_content(Some(file))?;
    library.edit_book(view.book.id, &content).await?;
    println!("edited {}", name);
    Ok(())
}

/// Links `name` to the repository with url `target`, or unlinks it when
/// `target` is `none`.
pub async fn link_notebook(config: &Config, name: &str, target: &str) -> Result<()> {
    let library = Library::open(config).await?;
    let Some(view) = library.book_by_name(name).await? else {
        bail!("Notebook '{}' not found", name);
    };

    if target == "none" {
        library.set_link(view.book.id, None).await?;
        println!("unlinked {}", name);
        return Ok(());
    }

    let repos = library.repos().await?;
    let Some(repo) = repos.iter().find(|r| r.url == target) else {
        return Err(SyncError::UnknownRepo {
            url: target.to_string(),
        }
        .into());
    };
    library.set_link(view.book.id, Some(repo.id)).await?;
    println!("linked {} -> {}", name, repo.url);
    Ok(())
}
