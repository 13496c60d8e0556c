//! Sync path for repositories that merge concurrent edits themselves.

use anyhow::{bail, Result};
use tracing::debug;

use crate::book_name::BookName;
use crate::error::SyncError;
use crate::library::{Library, RepoHandle};
use crate::namesake::BookNamesake;
use crate::status::SyncStatus;

/// Reconciles `namesake` against the two-way repository `repo`.
///
/// Returns `false` when the merge left conflicts. The link and sync
/// pointer follow the repository's new revision either way.
pub async fn handle_two_way_sync(
    library: &Library,
    repo: &RepoHandle,
    namesake: &BookNamesake,
) -> Result<bool> {
    let Some(two_way) = repo.backend.two_way() else {
        bail!("Repository {} does not support two-way sync", repo.url());
    };
    let Some(book) = namesake.book.as_ref() else {
        bail!("No local notebook for '{}'", namesake.name);
    };

    // Only local changes: a plain push is enough.
    if namesake.status == SyncStatus::BookWithLinkLocalModified {
        let synced = book
            .synced_to
            .as_ref()
            .ok_or_else(|| SyncError::MissingSyncedRook {
                name: book.book.name.clone(),
            })?;
        let link = book.link_repo.as_ref().ok_or_else(|| SyncError::MissingLink {
            name: book.book.name.clone(),
        })?;
        let target = library.repo_instance(link)?;
        let path = target.relative_path_of(&synced.uri)?;
        library.save_book_to_repo(&target, &path, book).await?;
        return Ok(true);
    }

    let current = book
        .synced_to
        .as_ref()
        .filter(|rook| rook.repo_uri == repo.url());
    let Some(some_rook) = current.or_else(|| {
        namesake
            .rooks
            .iter()
            .find(|rook| rook.repo_uri == repo.url())
    }) else {
        bail!("No revision of '{}' in {}", namesake.name, repo.url());
    };
    let path = repo.relative_path_of(&some_rook.uri)?;

    let export = library.temp_book_file()?;
    library.export_book(book, export.path())?;

    let result = two_way
        .sync_book(&path, current.map(|rook| rook.revision.as_str()), export.path())
        .await?;
    let new_rook = repo.rook(&result.book);

    if let Some(load_file) = &result.load_file {
        let name = BookName::from_repo_relative_path(&repo.relative_path_of(&new_rook.uri)?)?;
        debug!(name = %name.name, file = %load_file.display(), "Loading merged notebook");
        library
            .load_book_from_file(&name.name, load_file, Some(&new_rook))
            .await?;
    } else if result.merged {
        library.store().set_modified(book.book.id, false).await?;
    }

    library
        .update_book_link_and_sync(book.book.id, &new_rook)
        .await?;

    Ok(result.merged)
}
