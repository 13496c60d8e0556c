//! Local notebook storage.
//!
//! The [`NotebookStore`] trait holds everything the sync engine reads and
//! writes locally: registered repositories, notebooks, their repository
//! links, their last synced revision and their last sync action.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`sqlite::SqliteStore`] | CLI, persistent |
//! | [`memory::InMemoryStore`] | tests |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{BookAction, BookView, Repo, RepoType, VersionedRook};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait NotebookStore: Send + Sync {
    /// All registered repositories, ordered by id.
    async fn repos(&self) -> Result<Vec<Repo>>;

    /// Registers a repository. Idempotent on `url`.
    async fn register_repo(&self, repo_type: RepoType, url: &str) -> Result<Repo>;

    /// All notebooks with link and sync pointer, ordered by name.
    async fn books(&self) -> Result<Vec<BookView>>;

    async fn book(&self, id: i64) -> Result<Option<BookView>>;

    async fn book_by_name(&self, name: &str) -> Result<Option<BookView>>;

    /// Creates a notebook. Names are unique.
    async fn create_book(&self, name: &str, content: &str, is_dummy: bool) -> Result<BookView>;

    /// Replaces the content. The notebook stops being a placeholder.
    async fn write_content(&self, id: i64, content: &str) -> Result<()>;

    async fn set_modified(&self, id: i64, modified: bool) -> Result<()>;

    /// Links the notebook to a repository, or unlinks it with `None`.
    async fn set_link(&self, id: i64, repo_id: Option<i64>) -> Result<()>;

    /// Records the last synced revision, or clears it with `None`.
    async fn set_synced_to(&self, id: i64, rook: Option<&VersionedRook>) -> Result<()>;

    async fn set_last_action(&self, id: i64, action: &BookAction) -> Result<()>;
}
