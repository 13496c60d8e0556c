//! Repository backend traits and the registry that resolves them.
//!
//! Every configured repository is a [`SyncRepo`]: it can list the notebook
//! files it holds, retrieve one into a local file and store a local file
//! under a repo-relative path. Backends that can reconcile concurrent edits
//! themselves also implement [`TwoWaySyncRepo`].
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              RepoRegistry                │
//! │  ┌───────────┐ ┌─────────┐ ┌──────────┐  │
//! │  │ Directory │ │   S3    │ │   Git    │  │
//! │  │ (one-way) │ │(one-way)│ │(two-way) │  │
//! │  └───────────┘ └─────────┘ └──────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!      collect → classify → reconcile
//! ```
//!
//! The capability split is carried by [`RepoBackend`], so the dispatcher
//! checks for two-way support once instead of inspecting concrete types.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::book_name::BookFormat;
use crate::config::Config;
use crate::models::{RemoteBook, RepoType};

/// A repository notebooks can be pushed to and pulled from.
#[async_trait]
pub trait SyncRepo: Send + Sync {
    /// Url identifying this repository. Matches [`crate::models::Repo::url`].
    fn url(&self) -> &str;

    fn repo_type(&self) -> RepoType;

    /// Format of notebooks pushed here for the first time.
    fn format(&self) -> BookFormat {
        BookFormat::Org
    }

    /// Cheap "nothing changed since the last listing" signal.
    ///
    /// Backends without such a signal keep the default and are always
    /// listed in full.
    async fn is_unchanged(&self) -> Result<bool> {
        Ok(false)
    }

    /// Lists every notebook file in the repository.
    async fn list_books(&self) -> Result<Vec<RemoteBook>>;

    /// Downloads `path` into `dest`, returning the revision that was read.
    async fn retrieve_book(&self, path: &str, dest: &Path) -> Result<RemoteBook>;

    /// Uploads `src` to `path`, returning the new revision.
    async fn store_book(&self, src: &Path, path: &str) -> Result<RemoteBook>;
}

/// Result of a native two-way merge.
#[derive(Debug, Clone)]
pub struct TwoWaySync {
    /// Revision the repository now holds for the notebook.
    pub book: RemoteBook,
    /// `false` when the merge left conflicts for an operator to resolve.
    pub merged: bool,
    /// Merged content that differs from what was sent and must be loaded
    /// back into local storage.
    pub load_file: Option<PathBuf>,
}

/// A repository that merges local edits with remote ones itself.
#[async_trait]
pub trait TwoWaySyncRepo: SyncRepo {
    /// Branch (or equivalent) the repository syncs against.
    fn current_branch(&self) -> String;

    /// Three-way merges `local` into `path` using `ancestor` as the common
    /// base. `ancestor` is `None` on the first sync of a notebook.
    async fn sync_book(
        &self,
        path: &str,
        ancestor: Option<&str>,
        local: &Path,
    ) -> Result<TwoWaySync>;
}

/// A backend together with its capability.
#[derive(Clone)]
pub enum RepoBackend {
    OneWay(Arc<dyn SyncRepo>),
    TwoWay(Arc<dyn TwoWaySyncRepo>),
}

impl RepoBackend {
    pub fn url(&self) -> &str {
        match self {
            RepoBackend::OneWay(repo) => repo.url(),
            RepoBackend::TwoWay(repo) => repo.url(),
        }
    }

    pub fn repo_type(&self) -> RepoType {
        match self {
            RepoBackend::OneWay(repo) => repo.repo_type(),
            RepoBackend::TwoWay(repo) => repo.repo_type(),
        }
    }

    pub fn format(&self) -> BookFormat {
        match self {
            RepoBackend::OneWay(repo) => repo.format(),
            RepoBackend::TwoWay(repo) => repo.format(),
        }
    }

    pub fn two_way(&self) -> Option<&Arc<dyn TwoWaySyncRepo>> {
        match self {
            RepoBackend::OneWay(_) => None,
            RepoBackend::TwoWay(repo) => Some(repo),
        }
    }

    pub async fn is_unchanged(&self) -> Result<bool> {
        match self {
            RepoBackend::OneWay(repo) => repo.is_unchanged().await,
            RepoBackend::TwoWay(repo) => repo.is_unchanged().await,
        }
    }

    pub async fn list_books(&self) -> Result<Vec<RemoteBook>> {
        match self {
            RepoBackend::OneWay(repo) => repo.list_books().await,
            RepoBackend::TwoWay(repo) => repo.list_books().await,
        }
    }

    pub async fn retrieve_book(&self, path: &str, dest: &Path) -> Result<RemoteBook> {
        match self {
            RepoBackend::OneWay(repo) => repo.retrieve_book(path, dest).await,
            RepoBackend::TwoWay(repo) => repo.retrieve_book(path, dest).await,
        }
    }

    pub async fn store_book(&self, src: &Path, path: &str) -> Result<RemoteBook> {
        match self {
            RepoBackend::OneWay(repo) => repo.store_book(src, path).await,
            RepoBackend::TwoWay(repo) => repo.store_book(src, path).await,
        }
    }
}

/// Registry of repository backends keyed by url.
///
/// Use [`RepoRegistry::from_config`] for the built-in backends, then
/// [`register`](RepoRegistry::register) to add custom ones.
pub struct RepoRegistry {
    backends: Vec<RepoBackend>,
}

impl RepoRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Create a registry with every repository declared in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::repo_dir::DirectoryRepo;
        use crate::repo_git::GitRepo;
        use crate::repo_s3::S3Repo;

        let mut registry = Self::new();

        for cfg in config.repos.directory.values() {
            registry.register(RepoBackend::OneWay(Arc::new(DirectoryRepo::new(
                cfg.clone(),
            )?)));
        }
        for (name, cfg) in &config.repos.git {
            registry.register(RepoBackend::TwoWay(Arc::new(GitRepo::new(
                name.clone(),
                cfg.clone(),
                config.db.path.clone(),
            ))));
        }
        for cfg in config.repos.s3.values() {
            registry.register(RepoBackend::OneWay(Arc::new(S3Repo::new(cfg.clone()))));
        }

        Ok(registry)
    }

    /// Register a backend. A later registration for the same url wins.
    pub fn register(&mut self, backend: RepoBackend) {
        self.backends.retain(|b| b.url() != backend.url());
        self.backends.push(backend);
    }

    pub fn backends(&self) -> &[RepoBackend] {
        &self.backends
    }

    /// Find the backend for a repository url.
    pub fn find(&self, url: &str) -> Option<&RepoBackend> {
        self.backends.iter().find(|b| b.url() == url)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }
}

impl Default for RepoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
