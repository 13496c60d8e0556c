//! Revision collector: the remote side of a sync cycle.

use anyhow::{Context, Result};
use tracing::debug;

use crate::library::{Library, RepoHandle};
use crate::models::VersionedRook;

/// Gathers the remote revisions of every notebook in `repos`.
///
/// A repository that reports itself unchanged is not listed; the last
/// synced revision of each notebook linked to it stands in for the
/// listing. That shortcut is abandoned when it would yield nothing or when
/// a linked notebook has no synced revision to stand in.
///
/// Any listing failure aborts the whole collection.
pub async fn collect_remote_books(
    library: &Library,
    repos: &[RepoHandle],
) -> Result<Vec<VersionedRook>> {
    let books = library.books().await?;
    let mut result = Vec::new();

    for repo in repos {
        if repo.backend.is_unchanged().await? {
            let linked: Vec<_> = books
                .iter()
                .filter(|b| b.link_repo.as_ref().is_some_and(|r| r.url == repo.url()))
                .collect();
            let reused: Vec<VersionedRook> =
                linked.iter().filter_map(|b| b.synced_to.clone()).collect();

            if !reused.is_empty() && reused.len() == linked.len() {
                debug!(repo = %repo.url(), count = reused.len(), "Repository unchanged, reusing synced revisions");
                result.extend(reused);
                continue;
            }
        }

        let listed = repo
            .backend
            .list_books()
            .await
            .with_context(|| format!("Failed to list notebooks in {}", repo.url()))?;
        debug!(repo = %repo.url(), count = listed.len(), "Listed repository");
        result.extend(listed.iter().map(|remote| repo.rook(remote)));
    }

    Ok(result)
}
