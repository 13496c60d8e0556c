//! In-memory [`NotebookStore`] implementation for tests.
//!
//! All state sits behind one `std::sync::RwLock`; no lock is held across
//! an `.await`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Book, BookAction, BookView, Repo, RepoType, VersionedRook};

use super::NotebookStore;

struct StoredBook {
    book: Book,
    link_repo_id: Option<i64>,
    synced_to: Option<VersionedRook>,
}

#[derive(Default)]
struct State {
    repos: Vec<Repo>,
    books: BTreeMap<i64, StoredBook>,
    next_repo_id: i64,
    next_book_id: i64,
}

impl State {
    fn view(&self, stored: &StoredBook) -> BookView {
        BookView {
            book: stored.book.clone(),
            link_repo: stored
                .link_repo_id
                .and_then(|id| self.repos.iter().find(|r| r.id == id).cloned()),
            synced_to: stored.synced_to.clone(),
        }
    }

    fn book_mut(&mut self, id: i64) -> Result<&mut StoredBook> {
        match self.books.get_mut(&id) {
            Some(stored) => Ok(stored),
            None => bail!("Notebook {} not found", id),
        }
    }
}

pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotebookStore for InMemoryStore {
    async fn repos(&self) -> Result<Vec<Repo>> {
        Ok(self.state.read().unwrap().repos.clone())
    }

    async fn register_repo(&self, repo_type: RepoType, url: &str) -> Result<Repo> {
        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.repos.iter_mut().find(|r| r.url == url) {
            existing.repo_type = repo_type;
            return Ok(existing.clone());
        }
        state.next_repo_id += 1;
        let repo = Repo {
            id: state.next_repo_id,
            repo_type,
            url: url.to_string(),
        };
        state.repos.push(repo.clone());
        Ok(repo)
    }

    async fn books(&self) -> Result<Vec<BookView>> {
        let state = self.state.read().unwrap();
        let mut views: Vec<BookView> = state.books.values().map(|s| state.view(s)).collect();
        views.sort_by(|a, b| a.book.name.cmp(&b.book.name));
        Ok(views)
    }

    async fn book(&self, id: i64) -> Result<Option<BookView>> {
        let state = self.state.read().unwrap();
        Ok(state.books.get(&id).map(|s| state.view(s)))
    }

    async fn book_by_name(&self, name: &str) -> Result<Option<BookView>> {
        let state = self.state.read().unwrap();
        Ok(state
            .books
            .values()
            .find(|s| s.book.name == name)
            .map(|s| state.view(s)))
    }

    async fn create_book(&self, name: &str, content: &str, is_dummy: bool) -> Result<BookView> {
        let mut state = self.state.write().unwrap();
        if state.books.values().any(|s| s.book.name == name) {
            bail!("Notebook '{}' already exists", name);
        }
        state.next_book_id += 1;
        let id = state.next_book_id;
        let stored = StoredBook {
            book: Book {
                id,
                name: name.to_string(),
                content: content.to_string(),
                is_modified: false,
                is_dummy,
                last_action: None,
            },
            link_repo_id: None,
            synced_to: None,
        };
        let view = state.view(&stored);
        state.books.insert(id, stored);
        Ok(view)
    }

    async fn write_content(&self, id: i64, content: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let stored = state.book_mut(id)?;
        stored.book.content = content.to_string();
        stored.book.is_dummy = false;
        Ok(())
    }

    async fn set_modified(&self, id: i64, modified: bool) -> Result<()> {
        self.state.write().unwrap().book_mut(id)?.book.is_modified = modified;
        Ok(())
    }

    async fn set_link(&self, id: i64, repo_id: Option<i64>) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if let Some(repo_id) = repo_id {
            if !state.repos.iter().any(|r| r.id == repo_id) {
                bail!("Repository {} not found", repo_id);
            }
        }
        state.book_mut(id)?.link_repo_id = repo_id;
        Ok(())
    }

    async fn set_synced_to(&self, id: i64, rook: Option<&VersionedRook>) -> Result<()> {
        self.state.write().unwrap().book_mut(id)?.synced_to = rook.cloned();
        Ok(())
    }

    async fn set_last_action(&self, id: i64, action: &BookAction) -> Result<()> {
        self.state.write().unwrap().book_mut(id)?.book.last_action = Some(action.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_repo_is_idempotent() {
        let store = InMemoryStore::new();
        let a = store
            .register_repo(RepoType::Directory, "file:///notes")
            .await
            .unwrap();
        let b = store
            .register_repo(RepoType::Directory, "file:///notes")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.repos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_link_joins_repo_and_rejects_unknown() {
        let store = InMemoryStore::new();
        let repo = store.register_repo(RepoType::S3, "s3://b").await.unwrap();
        let book = store.create_book("todo", "", false).await.unwrap();

        store.set_link(book.book.id, Some(repo.id)).await.unwrap();
        let view = store.book_by_name("todo").await.unwrap().unwrap();
        assert_eq!(view.link_repo, Some(repo));

        assert!(store.set_link(book.book.id, Some(99)).await.is_err());
    }

    #[tokio::test]
    async fn test_write_content_clears_placeholder() {
        let store = InMemoryStore::new();
        let book = store.create_book("todo", "", true).await.unwrap();
        assert!(book.is_dummy());
        store.write_content(book.book.id, "* a").await.unwrap();
        let view = store.book(book.book.id).await.unwrap().unwrap();
        assert!(!view.is_dummy());
        assert_eq!(view.book.content, "* a");
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let store = InMemoryStore::new();
        store.create_book("todo", "", false).await.unwrap();
        assert!(store.create_book("todo", "", false).await.is_err());
    }
}
