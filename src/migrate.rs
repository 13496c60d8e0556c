use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Registered repositories, one row per configured url
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_type TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL DEFAULT '',
            is_modified INTEGER NOT NULL DEFAULT 0,
            is_dummy INTEGER NOT NULL DEFAULT 0,
            last_action_kind TEXT,
            last_action_message TEXT,
            last_action_at INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // At most one link per notebook
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS book_links (
            book_id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL,
            FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
            FOREIGN KEY (repo_id) REFERENCES repos(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Last synced revision; a copy of the rook, not a reference to it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS book_syncs (
            book_id INTEGER PRIMARY KEY,
            repo_id INTEGER NOT NULL,
            repo_type TEXT NOT NULL,
            repo_uri TEXT NOT NULL,
            uri TEXT NOT NULL,
            revision TEXT NOT NULL,
            mtime INTEGER NOT NULL,
            FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_book_links_repo_id ON book_links(repo_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
