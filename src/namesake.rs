//! Grouping of local notebooks and remote revisions by notebook name.

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::book_name::{repo_relative_path_of, BookName};
use crate::collect::collect_remote_books;
use crate::library::{Library, RepoHandle};
use crate::models::{BookView, VersionedRook};
use crate::status::{classify, SyncStatus};

/// Everything known about one notebook name in the current cycle.
#[derive(Debug, Clone)]
pub struct BookNamesake {
    pub name: String,
    /// Always set once grouping has created placeholders.
    pub book: Option<BookView>,
    pub rooks: Vec<VersionedRook>,
    pub status: SyncStatus,
    pub latest_linked_rook: Option<VersionedRook>,
}

impl BookNamesake {
    fn new(name: String) -> Self {
        Self {
            name,
            book: None,
            rooks: Vec::new(),
            status: SyncStatus::OnlyDummy,
            latest_linked_rook: None,
        }
    }

    /// Groups notebooks and rooks by name. Rooks whose path is not a
    /// notebook file are dropped.
    pub fn group(
        books: Vec<BookView>,
        rooks: Vec<VersionedRook>,
    ) -> BTreeMap<String, BookNamesake> {
        let mut namesakes: BTreeMap<String, BookNamesake> = BTreeMap::new();

        for book in books {
            let name = book.book.name.clone();
            namesakes
                .entry(name.clone())
                .or_insert_with(|| BookNamesake::new(name))
                .book = Some(book);
        }

        for rook in rooks {
            let name = match repo_relative_path_of(&rook.repo_uri, &rook.uri)
                .and_then(|path| BookName::from_repo_relative_path(&path))
            {
                Ok(name) => name.name,
                Err(e) => {
                    warn!(uri = %rook.uri, error = %e, "Ignoring remote file");
                    continue;
                }
            };
            namesakes
                .entry(name.clone())
                .or_insert_with(|| BookNamesake::new(name))
                .rooks
                .push(rook);
        }

        namesakes
    }

    /// A placeholder nobody linked, synced or observed remotely.
    fn is_abandoned_placeholder(&self) -> bool {
        self.rooks.is_empty()
            && self
                .book
                .as_ref()
                .is_some_and(|b| b.is_dummy() && !b.has_link() && !b.has_sync())
    }

    /// Whether the local notebook is linked to, or last synced with, a
    /// repository other than `repo_urls`.
    fn belongs_elsewhere(&self, repo_urls: &[&str]) -> bool {
        let Some(book) = self.book.as_ref() else {
            return false;
        };
        let linked_elsewhere = book
            .link_repo
            .as_ref()
            .is_some_and(|repo| !repo_urls.contains(&repo.url.as_str()));
        let synced_elsewhere = book
            .synced_to
            .as_ref()
            .is_some_and(|rook| !repo_urls.contains(&rook.repo_uri.as_str()));
        linked_elsewhere || synced_elsewhere
    }

    pub fn update_status(&mut self, repos_count: usize) {
        let classification = classify(self.book.as_ref(), &self.rooks, repos_count);
        self.status = classification.status;
        self.latest_linked_rook = classification.latest_linked_rook;
    }
}

/// Builds this cycle's namesakes across `repos`, creating a placeholder
/// notebook for every name that exists only remotely.
pub async fn group_all_notebooks_by_name(
    library: &Library,
    repos: &[RepoHandle],
) -> Result<BTreeMap<String, BookNamesake>> {
    group_notebooks(library, repos, false).await
}

/// Like [`group_all_notebooks_by_name`] for a cycle over a subset of the
/// repositories. Names whose notebook is linked to or synced with a
/// repository outside `repos` are left out, since their remote revisions
/// were not collected.
pub async fn group_notebooks_in_repos(
    library: &Library,
    repos: &[RepoHandle],
) -> Result<BTreeMap<String, BookNamesake>> {
    group_notebooks(library, repos, true).await
}

async fn group_notebooks(
    library: &Library,
    repos: &[RepoHandle],
    subset: bool,
) -> Result<BTreeMap<String, BookNamesake>> {
    debug!("Collecting all local and remote notebooks");

    let books = library.books().await?;
    let rooks = collect_remote_books(library, repos).await?;

    let mut namesakes = BookNamesake::group(books, rooks);
    namesakes.retain(|_, namesake| !namesake.is_abandoned_placeholder());

    if subset {
        let urls: Vec<&str> = repos.iter().map(|r| r.url()).collect();
        namesakes.retain(|name, namesake| {
            let keep = !namesake.belongs_elsewhere(&urls);
            if !keep {
                debug!(name = %name, "Skipped, tied to a repository outside this cycle");
            }
            keep
        });
    }

    for namesake in namesakes.values_mut() {
        if namesake.book.is_none() {
            namesake.book = Some(library.create_dummy_book(&namesake.name).await?);
        }
        namesake.update_status(repos.len());
        debug!(name = %namesake.name, status = ?namesake.status, rooks = namesake.rooks.len(), "Classified");
    }

    Ok(namesakes)
}
