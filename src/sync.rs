//! Reconciliation: one action per namesake, one cycle across repositories.
//!
//! ```text
//! sync_repos ──▶ group_all_notebooks_by_name ──▶ sync_namesake (per name)
//!                  (collect + classify)            │
//!                                                  ├─ two-way repo? ──▶ handle_two_way_sync
//!                                                  └─ status family ──▶ pull / push / unlink / report
//! ```

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::book_name::repo_relative_path;
use crate::error::SyncError;
use crate::library::{Library, RepoHandle};
use crate::models::{BookAction, BookActionKind};
use crate::namesake::{group_all_notebooks_by_name, group_notebooks_in_repos, BookNamesake};
use crate::status::{StatusFamily, SyncStatus};
use crate::two_way::handle_two_way_sync;

/// Runs one sync cycle over every registered repository.
pub async fn reconcile_all(library: &Library) -> Result<BTreeMap<String, BookAction>> {
    let repos = library.sync_repos().await?;
    let namesakes = group_all_notebooks_by_name(library, &repos).await?;
    reconcile(library, &repos, namesakes).await
}

/// Runs one sync cycle restricted to the repositories with the given urls.
///
/// Notebooks linked to or synced with any other repository are not touched.
pub async fn reconcile_repos(
    library: &Library,
    repo_urls: &[String],
) -> Result<BTreeMap<String, BookAction>> {
    let all = library.sync_repos().await?;
    let mut repos = Vec::with_capacity(repo_urls.len());
    for url in repo_urls {
        match all.iter().find(|r| r.url() == url) {
            Some(repo) => repos.push(repo.clone()),
            None => return Err(SyncError::UnknownRepo { url: url.clone() }.into()),
        }
    }
    let namesakes = group_notebooks_in_repos(library, &repos).await?;
    reconcile(library, &repos, namesakes).await
}

async fn reconcile(
    library: &Library,
    repos: &[RepoHandle],
    namesakes: BTreeMap<String, BookNamesake>,
) -> Result<BTreeMap<String, BookAction>> {
    let mut actions = BTreeMap::new();

    for (name, namesake) in &namesakes {
        let action = match sync_namesake(library, repos, namesake).await {
            Ok(action) => action,
            Err(e) => {
                warn!(name = %name, error = %e, "Sync failed");
                BookAction::error(format!("{:#}", e))
            }
        };

        if let Some(book) = &namesake.book {
            library
                .store()
                .set_last_action(book.book.id, &action)
                .await?;
        }

        match action.kind {
            BookActionKind::Info => info!(name = %name, "{}", action.message),
            BookActionKind::Error => warn!(name = %name, "{}", action.message),
        }
        actions.insert(name.clone(), action);
    }

    Ok(actions)
}

/// Performs the one corrective action for a namesake's status.
///
/// A merge conflict in a two-way repository is returned as
/// [`SyncError::MergeConflict`].
pub async fn sync_namesake(
    library: &Library,
    repos: &[RepoHandle],
    namesake: &BookNamesake,
) -> Result<BookAction> {
    let status = namesake.status;

    if status != SyncStatus::NoChange {
        let two_way_repo = namesake.rooks.iter().find_map(|rook| {
            repos
                .iter()
                .find(|r| r.url() == rook.repo_uri && r.backend.two_way().is_some())
        });
        if let Some(repo) = two_way_repo {
            if !handle_two_way_sync(library, repo, namesake).await? {
                return Err(SyncError::MergeConflict {
                    repo: repo.url().to_string(),
                }
                .into());
            }
            let branch = repo
                .backend
                .two_way()
                .map(|r| r.current_branch())
                .unwrap_or_default();
            return Ok(BookAction::info(format!("Synced with branch '{}'", branch)));
        }
    }

    let Some(book) = namesake.book.as_ref() else {
        bail!("No local notebook for '{}'", namesake.name);
    };

    let action = match status.family() {
        StatusFamily::NoOp => BookAction::info(status.msg()),

        StatusFamily::Error => BookAction::error(status.msg()),

        StatusFamily::Vanished => {
            library.set_link(book.book.id, None).await?;
            library.remove_book_synced_to(book.book.id).await?;
            BookAction::error(status.msg())
        }

        StatusFamily::LoadOnly => {
            let Some(rook) = namesake.rooks.first() else {
                bail!("No remote notebook to load for '{}'", namesake.name);
            };
            library.load_book_from_repo(rook).await?;
            BookAction::info(status.msg_with(&rook.uri))
        }

        StatusFamily::LoadViaLink => {
            let Some(rook) = namesake.latest_linked_rook.as_ref() else {
                bail!("No linked remote notebook to load for '{}'", namesake.name);
            };
            library.load_book_from_repo(rook).await?;
            BookAction::info(status.msg_with(&rook.uri))
        }

        StatusFamily::SaveOnly => {
            let Some(repo) = repos.first() else {
                bail!("No repository to save '{}' to", namesake.name);
            };
            let path = repo_relative_path(&book.book.name, repo.backend.format());
            // The link comes first so the notebook stays tied to this
            // repository even when the push is rejected.
            library.set_link(book.book.id, Some(repo.repo.id)).await?;
            library.save_book_to_repo(repo, &path, book).await?;
            BookAction::info(status.msg_with(repo.url()))
        }

        StatusFamily::SaveViaLink => {
            let link = book.link_repo.as_ref().ok_or_else(|| SyncError::MissingLink {
                name: book.book.name.clone(),
            })?;
            let repo = library.repo_instance(link)?;
            let path = if status == SyncStatus::BookWithLinkLocalModified {
                let synced = book
                    .synced_to
                    .as_ref()
                    .ok_or_else(|| SyncError::MissingSyncedRook {
                        name: book.book.name.clone(),
                    })?;
                repo.relative_path_of(&synced.uri)?
            } else {
                repo_relative_path(&book.book.name, repo.backend.format())
            };
            library.save_book_to_repo(&repo, &path, book).await?;
            BookAction::info(status.msg_with(repo.url()))
        }
    };

    Ok(action)
}
