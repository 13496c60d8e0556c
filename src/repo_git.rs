//! Git repository: notebooks in a remote Git branch, mirrored in a local
//! cache clone.
//!
//! Workflow:
//! 1. Determine a local cache directory for the clone.
//! 2. Clone on first use, afterwards fetch and hard-reset to the remote
//!    branch (the cache never holds unpushed commits).
//! 3. A file's revision is the last commit that touched it.
//! 4. Pushes commit straight onto the tracked branch; merges use
//!    `git merge-file` against the ancestor blob and park conflicting
//!    local content on a fresh `nbsync-conflict-*` branch.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::book_name::{BookFormat, BookName};
use crate::config::GitRepoConfig;
use crate::models::{RemoteBook, RepoType};
use crate::traits::{SyncRepo, TwoWaySync, TwoWaySyncRepo};

pub struct GitRepo {
    name: String,
    config: GitRepoConfig,
    cache_dir: PathBuf,
}

impl GitRepo {
    /// `db_path` anchors the default cache directory next to the database.
    pub fn new(name: String, config: GitRepoConfig, db_path: PathBuf) -> Self {
        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.join(short_hash(&config.url)),
            None => {
                let db_parent = db_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                db_parent.join(".git-cache").join(short_hash(&config.url))
            }
        };
        Self {
            name,
            config,
            cache_dir,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .arg("-c")
            .arg(format!("user.name={}", self.config.author_name))
            .arg("-c")
            .arg(format!("user.email={}", self.config.author_email))
            .args(args)
            .current_dir(&self.cache_dir)
            .output()
            .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))
    }

    fn git_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args[0], stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Clones on first use. Returns `true` when a fresh clone was made.
    fn ensure_clone(&self) -> Result<bool> {
        if self.cache_dir.join(".git").exists() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!(
                "Failed to create cache directory: {}",
                self.cache_dir.display()
            )
        })?;

        let output = Command::new("git")
            .args(["clone", "--branch", &self.config.branch, "--single-branch"])
            .arg(&self.config.url)
            .arg(&self.cache_dir)
            .output()
            .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git clone failed: {}", stderr.trim());
        }
        debug!(repo = %self.name, dir = %self.cache_dir.display(), "cloned git repository");
        Ok(true)
    }

    fn remote_ref(&self) -> String {
        format!("origin/{}", self.config.branch)
    }

    fn fetch(&self) -> Result<()> {
        self.git_ok(&["fetch", "origin", &self.config.branch])?;
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        self.ensure_clone()?;
        self.fetch()?;
        let remote_ref = self.remote_ref();
        self.git_ok(&["checkout", "--quiet", &self.config.branch])?;
        self.git_ok(&["reset", "--hard", "--quiet", &remote_ref])?;
        Ok(())
    }

    fn worktree_path(&self, relative: &str) -> Result<PathBuf> {
        let relative = relative.trim_start_matches('/');
        if relative.split('/').any(|part| part == ".." || part == ".git") {
            bail!("Path escapes repository worktree: {}", relative);
        }
        Ok(self.cache_dir.join(relative))
    }

    /// Last commit touching `relative` and its commit time.
    fn file_revision(&self, relative: &str) -> Result<RemoteBook> {
        let out = self.git_ok(&["log", "-1", "--format=%H %ct", "--", relative])?;
        let Some((sha, ts)) = out.split_once(' ') else {
            bail!("No commit found for {} in {}", relative, self.config.url);
        };
        Ok(RemoteBook {
            path: relative.to_string(),
            revision: sha.to_string(),
            mtime: ts.parse::<i64>().unwrap_or(0),
        })
    }

    /// Stages `relative` and commits it if anything changed. Returns whether
    /// a commit was made.
    fn commit_file(&self, relative: &str, message: &str) -> Result<bool> {
        self.git_ok(&["add", "--", relative])?;
        let staged = self.git(&["diff", "--cached", "--quiet"])?;
        if staged.status.success() {
            return Ok(false);
        }
        self.git_ok(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    fn push(&self, refspec: &str) -> Result<()> {
        self.git_ok(&["push", "--quiet", "origin", refspec])?;
        Ok(())
    }

    fn show_blob(&self, revision: &str, relative: &str) -> Option<Vec<u8>> {
        let spec = format!("{}:{}", revision, relative);
        let output = self.git(&["show", &spec]).ok()?;
        output.status.success().then_some(output.stdout)
    }

    fn merge_file(&self, ours: &[u8], base: &[u8], theirs: &[u8]) -> Result<(Vec<u8>, bool)> {
        let ours_file = temp_with(ours)?;
        let base_file = temp_with(base)?;
        let theirs_file = temp_with(theirs)?;

        let output = Command::new("git")
            .args(["merge-file", "-p", "-L", "local", "-L", "base", "-L", "remote"])
            .arg(ours_file.path())
            .arg(base_file.path())
            .arg(theirs_file.path())
            .output()
            .with_context(|| "Failed to execute 'git merge-file'")?;

        match output.status.code() {
            Some(0) => Ok((output.stdout, true)),
            Some(n) if (1..=127).contains(&n) => Ok((output.stdout, false)),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                bail!("git merge-file failed: {}", stderr.trim());
            }
        }
    }

    /// Commits `content` for `relative` on a new branch and pushes it.
    fn park_on_conflict_branch(&self, relative: &str, content: &[u8]) -> Result<String> {
        let branch = format!("nbsync-conflict-{}", Uuid::new_v4().simple());
        self.git_ok(&["checkout", "--quiet", "-b", &branch])?;

        let result = (|| -> Result<()> {
            let path = self.worktree_path(relative)?;
            write_file(&path, content)?;
            self.commit_file(relative, &format!("Conflicting local version of {}", relative))?;
            self.push(&branch)
        })();

        self.git_ok(&["checkout", "--quiet", "--force", &self.config.branch])?;
        result?;
        Ok(branch)
    }
}

#[async_trait]
impl SyncRepo for GitRepo {
    fn url(&self) -> &str {
        &self.config.url
    }

    fn repo_type(&self) -> RepoType {
        RepoType::Git
    }

    fn format(&self) -> BookFormat {
        self.config.format
    }

    async fn is_unchanged(&self) -> Result<bool> {
        if self.ensure_clone()? {
            return Ok(false);
        }
        self.fetch()?;
        let head = self.git_ok(&["rev-parse", "HEAD"])?;
        let remote = self.git_ok(&["rev-parse", &self.remote_ref()])?;
        Ok(head == remote)
    }

    async fn list_books(&self) -> Result<Vec<RemoteBook>> {
        self.refresh()?;

        let mut books = Vec::new();
        for entry in WalkDir::new(&self.cache_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.cache_dir).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");
            if rel_str.starts_with(".git/") || !BookName::is_supported(&rel_str) {
                continue;
            }
            books.push(self.file_revision(&rel_str)?);
        }

        books.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(books)
    }

    async fn retrieve_book(&self, path: &str, dest: &Path) -> Result<RemoteBook> {
        self.ensure_clone()?;
        let src = self.worktree_path(path)?;
        std::fs::copy(&src, dest).with_context(|| format!("Failed to read {}", src.display()))?;
        self.file_revision(path)
    }

    async fn store_book(&self, src: &Path, path: &str) -> Result<RemoteBook> {
        self.refresh()?;
        let dest = self.worktree_path(path)?;
        let content =
            std::fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
        write_file(&dest, &content)?;
        if self.commit_file(path, &format!("Update {}", path))? {
            self.push(&format!("HEAD:{}", self.config.branch))?;
        }
        self.file_revision(path)
    }
}

#[async_trait]
impl TwoWaySyncRepo for GitRepo {
    fn current_branch(&self) -> String {
        self.config.branch.clone()
    }

    async fn sync_book(
        &self,
        path: &str,
        ancestor: Option<&str>,
        local: &Path,
    ) -> Result<TwoWaySync> {
        self.refresh()?;

        let worktree_file = self.worktree_path(path)?;
        let ours =
            std::fs::read(local).with_context(|| format!("Failed to read {}", local.display()))?;

        let theirs = match std::fs::read(&worktree_file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_file(&worktree_file, &ours)?;
                self.commit_file(path, &format!("Add {}", path))?;
                self.push(&format!("HEAD:{}", self.config.branch))?;
                return Ok(TwoWaySync {
                    book: self.file_revision(path)?,
                    merged: true,
                    load_file: None,
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", worktree_file.display()))
            }
        };

        if theirs == ours {
            return Ok(TwoWaySync {
                book: self.file_revision(path)?,
                merged: true,
                load_file: None,
            });
        }

        let base = ancestor
            .and_then(|rev| self.show_blob(rev, path))
            .unwrap_or_default();
        let (merged, clean) = self.merge_file(&ours, &base, &theirs)?;

        if !clean {
            let branch = self.park_on_conflict_branch(path, &ours)?;
            warn!(repo = %self.name, path, branch = %branch, "merge conflict, local version pushed to side branch");
            return Ok(TwoWaySync {
                book: self.file_revision(path)?,
                merged: false,
                load_file: None,
            });
        }

        write_file(&worktree_file, &merged)?;
        if self.commit_file(path, &format!("Merge {}", path))? {
            self.push(&format!("HEAD:{}", self.config.branch))?;
        }

        Ok(TwoWaySync {
            book: self.file_revision(path)?,
            merged: true,
            load_file: (merged != ours).then_some(worktree_file),
        })
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn temp_with(content: &[u8]) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}
