//! Directory repository: notebooks stored as files under a local root.
//!
//! The revision marker is the SHA-256 of the file content, so touching a
//! file without changing it is not a remote change.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::book_name::{BookFormat, BookName};
use crate::config::DirectoryRepoConfig;
use crate::models::{RemoteBook, RepoType};
use crate::traits::SyncRepo;

pub struct DirectoryRepo {
    url: String,
    config: DirectoryRepoConfig,
    excludes: GlobSet,
}

impl DirectoryRepo {
    pub fn new(config: DirectoryRepoConfig) -> Result<Self> {
        let mut patterns = vec!["**/.git/**".to_string()];
        patterns.extend(config.exclude_globs.iter().cloned());
        let excludes = build_globset(&patterns)
            .with_context(|| format!("Invalid exclude_globs for {}", config.root.display()))?;
        Ok(Self {
            url: config.url(),
            config,
            excludes,
        })
    }

    /// Whether a repo-relative path is hidden by the exclude rules.
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.excludes.is_match(relative.trim_start_matches('/'))
    }

    fn full_path(&self, relative: &str) -> Result<PathBuf> {
        let relative = relative.trim_start_matches('/');
        if relative.split('/').any(|part| part == "..") {
            bail!("Path escapes repository root: {}", relative);
        }
        Ok(self.config.root.join(relative))
    }
}

#[async_trait]
impl SyncRepo for DirectoryRepo {
    fn url(&self) -> &str {
        &self.url
    }

    fn repo_type(&self) -> RepoType {
        RepoType::Directory
    }

    fn format(&self) -> BookFormat {
        self.config.format
    }

    async fn list_books(&self) -> Result<Vec<RemoteBook>> {
        scan_directory(&self.config.root, &self.excludes, self.config.follow_symlinks)
    }

    async fn retrieve_book(&self, path: &str, dest: &Path) -> Result<RemoteBook> {
        let src = self.full_path(path)?;
        std::fs::copy(&src, dest)
            .with_context(|| format!("Failed to read {}", src.display()))?;
        file_to_remote_book(&src, path)
    }

    async fn store_book(&self, src: &Path, path: &str) -> Result<RemoteBook> {
        // An excluded file would never be listed again.
        if self.is_excluded(path) {
            bail!("Path is excluded in {}: {}", self.url, path);
        }
        let dest = self.full_path(path)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::copy(src, &dest)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        file_to_remote_book(&dest, path)
    }
}

fn scan_directory(
    root: &Path,
    excludes: &GlobSet,
    follow_symlinks: bool,
) -> Result<Vec<RemoteBook>> {
    if !root.exists() {
        bail!("Directory repository root does not exist: {}", root.display());
    }

    let mut books = Vec::new();

    let walker = WalkDir::new(root).follow_links(follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if excludes.is_match(&rel_str) || !BookName::is_supported(&rel_str) {
            continue;
        }

        books.push(file_to_remote_book(path, &rel_str)?);
    }

    books.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(books)
}

fn file_to_remote_book(path: &Path, relative_path: &str) -> Result<RemoteBook> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let mtime = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let body = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&body);

    Ok(RemoteBook {
        path: relative_path.to_string(),
        revision: format!("{:x}", hasher.finalize()),
        mtime,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_name::BookFormat;
    use tempfile::TempDir;

    fn repo(root: &Path) -> DirectoryRepo {
        DirectoryRepo::new(DirectoryRepoConfig {
            root: root.to_path_buf(),
            format: BookFormat::Org,
            exclude_globs: vec!["archive/**".to_string()],
            follow_symlinks: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lists_only_notebook_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("todo.org"), "* TODO a").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "no").unwrap();
        std::fs::create_dir_all(tmp.path().join("journal")).unwrap();
        std::fs::write(tmp.path().join("journal/2024.md"), "# 2024").unwrap();
        std::fs::create_dir_all(tmp.path().join("archive")).unwrap();
        std::fs::write(tmp.path().join("archive/old.org"), "old").unwrap();

        let books = repo(tmp.path()).list_books().await.unwrap();
        let paths: Vec<_> = books.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["journal/2024.md", "todo.org"]);
    }

    #[tokio::test]
    async fn test_store_then_retrieve_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        let repo = repo(&root);

        let src = tmp.path().join("export.org");
        std::fs::write(&src, "* Heading\n  ünïcode body\n").unwrap();
        let stored = repo.store_book(&src, "nested/todo.org").await.unwrap();

        let dest = tmp.path().join("import.org");
        let read = repo.retrieve_book("nested/todo.org", &dest).await.unwrap();
        assert_eq!(stored.revision, read.revision);
        assert_eq!(
            std::fs::read(&src).unwrap(),
            std::fs::read(&dest).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rejects_paths_escaping_root() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("export.org");
        std::fs::write(&src, "x").unwrap();
        let err = repo(tmp.path())
            .store_book(&src, "../evil.org")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[tokio::test]
    async fn test_refuses_to_store_excluded_path() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("export.org");
        std::fs::write(&src, "x").unwrap();
        let repo = repo(tmp.path());

        let err = repo.store_book(&src, "archive/old.org").await.unwrap_err();
        assert!(err.to_string().contains("excluded"));
        assert!(!tmp.path().join("archive/old.org").exists());
        assert!(repo.store_book(&src, "kept.org").await.is_ok());
    }

    #[test]
    fn test_invalid_exclude_glob_is_rejected() {
        let result = DirectoryRepo::new(DirectoryRepoConfig {
            root: PathBuf::from("/tmp"),
            format: BookFormat::Org,
            exclude_globs: vec!["[unclosed".to_string()],
            follow_symlinks: false,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_root_fails_listing() {
        let tmp = TempDir::new().unwrap();
        let result = repo(&tmp.path().join("missing")).list_books().await;
        assert!(result.is_err());
    }
}
