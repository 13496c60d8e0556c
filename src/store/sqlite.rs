//! SQLite-backed [`NotebookStore`] implementation.
//!
//! Maps each operation onto the `repos`, `books`, `book_links` and
//! `book_syncs` tables created by [`crate::migrate`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::models::{
    Book, BookAction, BookActionKind, BookView, Repo, RepoType, VersionedRook,
};

use super::NotebookStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_views(&self, filter: &str, bind: Option<BookKey<'_>>) -> Result<Vec<BookView>> {
        let sql = format!("{} {} ORDER BY b.name", BOOK_VIEW_SELECT, filter);
        let mut query = sqlx::query(&sql);
        match bind {
            Some(BookKey::Id(id)) => query = query.bind(id),
            Some(BookKey::Name(name)) => query = query.bind(name),
            None => {}
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_view).collect()
    }
}

fn ensure_updated(result: SqliteQueryResult, id: i64) -> Result<()> {
    if result.rows_affected() == 0 {
        bail!("Notebook {} not found", id);
    }
    Ok(())
}

enum BookKey<'a> {
    Id(i64),
    Name(&'a str),
}

const BOOK_VIEW_SELECT: &str = r#"
    SELECT b.id, b.name, b.content, b.is_modified, b.is_dummy,
           b.last_action_kind, b.last_action_message, b.last_action_at,
           lr.id AS link_repo_id, lr.repo_type AS link_repo_type, lr.url AS link_repo_url,
           s.repo_id AS sync_repo_id, s.repo_type AS sync_repo_type,
           s.repo_uri AS sync_repo_uri, s.uri AS sync_uri,
           s.revision AS sync_revision, s.mtime AS sync_mtime
    FROM books b
    LEFT JOIN book_links l ON l.book_id = b.id
    LEFT JOIN repos lr ON lr.id = l.repo_id
    LEFT JOIN book_syncs s ON s.book_id = b.id
"#;

fn parse_repo_type(value: &str) -> Result<RepoType> {
    RepoType::parse(value).with_context(|| format!("Unknown repository type '{}'", value))
}

fn row_to_repo(row: &SqliteRow) -> Result<Repo> {
    let repo_type: String = row.try_get("repo_type")?;
    Ok(Repo {
        id: row.try_get("id")?,
        repo_type: parse_repo_type(&repo_type)?,
        url: row.try_get("url")?,
    })
}

fn row_to_view(row: &SqliteRow) -> Result<BookView> {
    let last_action = match (
        row.try_get::<Option<String>, _>("last_action_kind")?,
        row.try_get::<Option<String>, _>("last_action_message")?,
        row.try_get::<Option<i64>, _>("last_action_at")?,
    ) {
        (Some(kind), Some(message), Some(at)) => Some(BookAction {
            kind: BookActionKind::parse(&kind)
                .with_context(|| format!("Unknown action kind '{}'", kind))?,
            message,
            timestamp: DateTime::from_timestamp_millis(at).unwrap_or_default(),
        }),
        _ => None,
    };

    let link_repo = match row.try_get::<Option<i64>, _>("link_repo_id")? {
        Some(id) => {
            let repo_type: String = row.try_get("link_repo_type")?;
            Some(Repo {
                id,
                repo_type: parse_repo_type(&repo_type)?,
                url: row.try_get("link_repo_url")?,
            })
        }
        None => None,
    };

    let synced_to = match row.try_get::<Option<i64>, _>("sync_repo_id")? {
        Some(repo_id) => {
            let repo_type: String = row.try_get("sync_repo_type")?;
            Some(VersionedRook {
                repo_id,
                repo_type: parse_repo_type(&repo_type)?,
                repo_uri: row.try_get("sync_repo_uri")?,
                uri: row.try_get("sync_uri")?,
                revision: row.try_get("sync_revision")?,
                mtime: row.try_get("sync_mtime")?,
            })
        }
        None => None,
    };

    Ok(BookView {
        book: Book {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            content: row.try_get("content")?,
            is_modified: row.try_get("is_modified")?,
            is_dummy: row.try_get("is_dummy")?,
            last_action,
        },
        link_repo,
        synced_to,
    })
}

#[async_trait]
impl NotebookStore for SqliteStore {
    async fn repos(&self) -> Result<Vec<Repo>> {
        let rows = sqlx::query("SELECT id, repo_type, url FROM repos ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_repo).collect()
    }

    async fn register_repo(&self, repo_type: RepoType, url: &str) -> Result<Repo> {
        sqlx::query(
            r#"
            INSERT INTO repos (repo_type, url) VALUES (?, ?)
            ON CONFLICT(url) DO UPDATE SET repo_type = excluded.repo_type
            "#,
        )
        .bind(repo_type.as_str())
        .bind(url)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, repo_type, url FROM repos WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        row_to_repo(&row)
    }

    async fn books(&self) -> Result<Vec<BookView>> {
        self.fetch_views("", None).await
    }

    async fn book(&self, id: i64) -> Result<Option<BookView>> {
        Ok(self
            .fetch_views("WHERE b.id = ?", Some(BookKey::Id(id)))
            .await?
            .into_iter()
            .next())
    }

    async fn book_by_name(&self, name: &str) -> Result<Option<BookView>> {
        Ok(self
            .fetch_views("WHERE b.name = ?", Some(BookKey::Name(name)))
            .await?
            .into_iter()
            .next())
    }

    async fn create_book(&self, name: &str, content: &str, is_dummy: bool) -> Result<BookView> {
        let result = sqlx::query(
            "INSERT INTO books (name, content, is_modified, is_dummy) VALUES (?, ?, 0, ?)",
        )
        .bind(name)
        .bind(content)
        .bind(is_dummy)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create notebook '{}'", name))?;

        let id = result.last_insert_rowid();
        match self.book(id).await? {
            Some(view) => Ok(view),
            None => bail!("Notebook '{}' vanished after insert", name),
        }
    }

    async fn write_content(&self, id: i64, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE books SET content = ?, is_dummy = 0 WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;
        ensure_updated(result, id)
    }

    async fn set_modified(&self, id: i64, modified: bool) -> Result<()> {
        let result = sqlx::query("UPDATE books SET is_modified = ? WHERE id = ?")
            .bind(modified)
            .bind(id)
            .execute(&self.pool)
            .await?;
        ensure_updated(result, id)
    }

    async fn set_link(&self, id: i64, repo_id: Option<i64>) -> Result<()> {
        match repo_id {
            Some(repo_id) => {
                sqlx::query(
                    r#"
                    INSERT INTO book_links (book_id, repo_id) VALUES (?, ?)
                    ON CONFLICT(book_id) DO UPDATE SET repo_id = excluded.repo_id
                    "#,
                )
                .bind(id)
                .bind(repo_id)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to link notebook {} to repo {}", id, repo_id))?;
            }
            None => {
                sqlx::query("DELETE FROM book_links WHERE book_id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn set_synced_to(&self, id: i64, rook: Option<&VersionedRook>) -> Result<()> {
        match rook {
            Some(rook) => {
                sqlx::query(
                    r#"
                    INSERT INTO book_syncs (book_id, repo_id, repo_type, repo_uri, uri, revision, mtime)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(book_id) DO UPDATE SET
                        repo_id = excluded.repo_id,
                        repo_type = excluded.repo_type,
                        repo_uri = excluded.repo_uri,
                        uri = excluded.uri,
                        revision = excluded.revision,
                        mtime = excluded.mtime
                    "#,
                )
                .bind(id)
                .bind(rook.repo_id)
                .bind(rook.repo_type.as_str())
                .bind(&rook.repo_uri)
                .bind(&rook.uri)
                .bind(&rook.revision)
                .bind(rook.mtime)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM book_syncs WHERE book_id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn set_last_action(&self, id: i64, action: &BookAction) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET last_action_kind = ?, last_action_message = ?, last_action_at = ?
            WHERE id = ?
            "#,
        )
        .bind(action.kind.as_str())
        .bind(&action.message)
        .bind(action.timestamp.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, ReposConfig, SyncConfig};
    use tempfile::TempDir;

    async fn open(tmp: &TempDir) -> SqliteStore {
        let config = Config {
            db: DbConfig {
                path: tmp.path().join("nbsync.sqlite"),
            },
            sync: SyncConfig::default(),
            repos: ReposConfig::default(),
        };
        crate::migrate::run_migrations(&config).await.unwrap();
        SqliteStore::new(crate::db::connect(&config).await.unwrap())
    }

    #[tokio::test]
    async fn test_book_view_joins_link_and_sync() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;

        let repo = store
            .register_repo(RepoType::Directory, "file:///notes")
            .await
            .unwrap();
        let book = store.create_book("todo", "* a", false).await.unwrap();
        assert!(book.link_repo.is_none());

        let rook = VersionedRook {
            repo_id: repo.id,
            repo_type: repo.repo_type,
            repo_uri: repo.url.clone(),
            uri: "file:///notes/todo.org".to_string(),
            revision: "abc".to_string(),
            mtime: 1700000000,
        };
        store.set_link(book.book.id, Some(repo.id)).await.unwrap();
        store.set_synced_to(book.book.id, Some(&rook)).await.unwrap();
        store
            .set_last_action(book.book.id, &BookAction::error("boom"))
            .await
            .unwrap();

        let view = store.book_by_name("todo").await.unwrap().unwrap();
        assert_eq!(view.link_repo, Some(repo));
        assert_eq!(view.synced_to, Some(rook));
        assert!(view.last_action_was_error());

        store.set_link(book.book.id, None).await.unwrap();
        store.set_synced_to(book.book.id, None).await.unwrap();
        let view = store.book(book.book.id).await.unwrap().unwrap();
        assert!(!view.has_link());
        assert!(!view.has_sync());
    }

    #[tokio::test]
    async fn test_register_repo_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        let a = store.register_repo(RepoType::S3, "s3://b").await.unwrap();
        let b = store.register_repo(RepoType::S3, "s3://b").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.repos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_updates_on_missing_book_fail() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        assert!(store.set_modified(42, true).await.is_err());
        assert!(store.write_content(42, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_books_ordered_by_name() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        store.create_book("zeta", "", false).await.unwrap();
        store.create_book("alpha", "", true).await.unwrap();
        let names: Vec<_> = store
            .books()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.book.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
