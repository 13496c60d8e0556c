//! Local storage facade used by the sync engine.
//!
//! A [`Library`] ties the [`NotebookStore`] to the [`RepoRegistry`]: it
//! knows which registered repository maps to which backend, moves
//! notebook content between the store and repositories through temporary
//! files, and keeps the link and sync pointer of each notebook current.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::book_name::{repo_relative_path_of, rook_uri, BookName};
use crate::config::Config;
use crate::error::SyncError;
use crate::models::{BookView, RemoteBook, Repo, VersionedRook};
use crate::store::{NotebookStore, SqliteStore};
use crate::traits::{RepoBackend, RepoRegistry};

/// A registered repository together with the backend that serves it.
#[derive(Clone)]
pub struct RepoHandle {
    pub repo: Repo,
    pub backend: RepoBackend,
}

impl RepoHandle {
    pub fn url(&self) -> &str {
        &self.repo.url
    }

    /// Ties a backend listing entry to this repository.
    pub fn rook(&self, remote: &RemoteBook) -> VersionedRook {
        VersionedRook {
            repo_id: self.repo.id,
            repo_type: self.repo.repo_type,
            repo_uri: self.repo.url.clone(),
            uri: rook_uri(&self.repo.url, &remote.path),
            revision: remote.revision.clone(),
            mtime: remote.mtime,
        }
    }

    pub fn relative_path_of(&self, uri: &str) -> Result<String> {
        repo_relative_path_of(&self.repo.url, uri)
    }
}

pub struct Library {
    store: Arc<dyn NotebookStore>,
    registry: RepoRegistry,
    temp_dir: Option<PathBuf>,
}

impl Library {
    pub fn new(
        store: Arc<dyn NotebookStore>,
        registry: RepoRegistry,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            registry,
            temp_dir,
        }
    }

    /// Opens the SQLite-backed library described by `config` and registers
    /// every configured repository.
    pub async fn open(config: &Config) -> Result<Self> {
        crate::migrate::run_migrations(config).await?;
        let pool = crate::db::connect(config).await?;
        let library = Self::new(
            Arc::new(SqliteStore::new(pool)),
            RepoRegistry::from_config(config)?,
            config.sync.temp_dir.clone(),
        );
        library.register_configured_repos().await?;
        Ok(library)
    }

    pub fn store(&self) -> &Arc<dyn NotebookStore> {
        &self.store
    }

    /// Records every backend of the registry in the store. Idempotent.
    pub async fn register_configured_repos(&self) -> Result<Vec<Repo>> {
        let mut repos = Vec::with_capacity(self.registry.len());
        for backend in self.registry.backends() {
            repos.push(
                self.store
                    .register_repo(backend.repo_type(), backend.url())
                    .await?,
            );
        }
        Ok(repos)
    }

    pub async fn books(&self) -> Result<Vec<BookView>> {
        self.store.books().await
    }

    pub async fn book_by_name(&self, name: &str) -> Result<Option<BookView>> {
        self.store.book_by_name(name).await
    }

    pub async fn repos(&self) -> Result<Vec<Repo>> {
        self.store.repos().await
    }

    /// Registered repositories that have a configured backend.
    ///
    /// Repositories left in the store after being removed from the config
    /// are skipped with a warning.
    pub async fn sync_repos(&self) -> Result<Vec<RepoHandle>> {
        let mut handles = Vec::new();
        for repo in self.store.repos().await? {
            match self.registry.find(&repo.url) {
                Some(backend) => handles.push(RepoHandle {
                    repo,
                    backend: backend.clone(),
                }),
                None => warn!(url = %repo.url, "Repository has no configured backend, skipping"),
            }
        }
        Ok(handles)
    }

    /// Resolves the backend for a registered repository.
    pub fn repo_instance(&self, repo: &Repo) -> Result<RepoHandle> {
        match self.registry.find(&repo.url) {
            Some(backend) => Ok(RepoHandle {
                repo: repo.clone(),
                backend: backend.clone(),
            }),
            None => Err(SyncError::UnknownRepo {
                url: repo.url.clone(),
            }
            .into()),
        }
    }

    fn repo_instance_for_rook(&self, rook: &VersionedRook) -> Result<RepoHandle> {
        self.repo_instance(&Repo {
            id: rook.repo_id,
            repo_type: rook.repo_type,
            url: rook.repo_uri.clone(),
        })
    }

    /// Adds a user notebook with `content`.
    pub async fn create_book(&self, name: &str, content: &str) -> Result<BookView> {
        self.store.create_book(name, content, false).await
    }

    /// Adds an empty placeholder for a name that exists only remotely.
    pub async fn create_dummy_book(&self, name: &str) -> Result<BookView> {
        debug!(name, "Creating placeholder notebook");
        self.store.create_book(name, "", true).await
    }

    /// Replaces a notebook's content as a local edit.
    pub async fn edit_book(&self, id: i64, content: &str) -> Result<()> {
        self.store.write_content(id, content).await?;
        self.store.set_modified(id, true).await
    }

    pub async fn set_link(&self, book_id: i64, repo_id: Option<i64>) -> Result<()> {
        self.store.set_link(book_id, repo_id).await
    }

    pub async fn remove_book_synced_to(&self, book_id: i64) -> Result<()> {
        self.store.set_synced_to(book_id, None).await
    }

    /// Points the notebook's link at the rook's repository and records the
    /// rook as last synced.
    pub async fn update_book_link_and_sync(
        &self,
        book_id: i64,
        rook: &VersionedRook,
    ) -> Result<()> {
        self.store.set_link(book_id, Some(rook.repo_id)).await?;
        self.store.set_synced_to(book_id, Some(rook)).await
    }

    /// A scratch file that is deleted when dropped.
    pub fn temp_book_file(&self) -> Result<NamedTempFile> {
        let file = match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                NamedTempFile::new_in(dir)
            }
            None => NamedTempFile::new(),
        };
        file.context("Failed to create temporary notebook file")
    }

    /// Writes the stored content of a notebook to `dest`.
    pub fn export_book(&self, book: &BookView, dest: &Path) -> Result<()> {
        std::fs::write(dest, &book.book.content)
            .with_context(|| format!("Failed to export '{}' to {}", book.book.name, dest.display()))
    }

    /// Pushes the notebook to `relative_path` in `repo`, then links it and
    /// records the new revision.
    pub async fn save_book_to_repo(
        &self,
        repo: &RepoHandle,
        relative_path: &str,
        book: &BookView,
    ) -> Result<VersionedRook> {
        let tmp = self.temp_book_file()?;
        self.export_book(book, tmp.path())?;

        let stored = repo
            .backend
            .store_book(tmp.path(), relative_path)
            .await
            .with_context(|| format!("Failed to save '{}' to {}", book.book.name, repo.url()))?;
        let rook = repo.rook(&stored);

        self.update_book_link_and_sync(book.book.id, &rook).await?;
        self.store.set_modified(book.book.id, false).await?;
        debug!(name = %book.book.name, uri = %rook.uri, "Saved notebook");
        Ok(rook)
    }

    /// Pulls the rook's content into the notebook of the same name.
    pub async fn load_book_from_repo(&self, rook: &VersionedRook) -> Result<BookView> {
        let repo = self.repo_instance_for_rook(rook)?;
        let relative = repo.relative_path_of(&rook.uri)?;

        let tmp = self.temp_book_file()?;
        let read = repo
            .backend
            .retrieve_book(&relative, tmp.path())
            .await
            .with_context(|| format!("Failed to load {}", rook.uri))?;
        let loaded = repo.rook(&read);

        let name = BookName::from_repo_relative_path(&relative)?;
        self.load_book_from_file(&name.name, tmp.path(), Some(&loaded))
            .await
    }

    /// Imports `file` as the content of notebook `name`, creating it if
    /// needed. The result is unmodified; with a rook it is also linked and
    /// marked synced to it.
    pub async fn load_book_from_file(
        &self,
        name: &str,
        file: &Path,
        rook: Option<&VersionedRook>,
    ) -> Result<BookView> {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let id = match self.store.book_by_name(name).await? {
            Some(existing) => existing.book.id,
            None => self.store.create_book(name, "", false).await?.book.id,
        };
        self.store.write_content(id, &content).await?;
        self.store.set_modified(id, false).await?;
        if let Some(rook) = rook {
            self.update_book_link_and_sync(id, rook).await?;
        }

        match self.store.book(id).await? {
            Some(view) => Ok(view),
            None => anyhow::bail!("Notebook '{}' disappeared while loading", name),
        }
    }
}
