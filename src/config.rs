//! TOML configuration parsing.
//!
//! Repositories are declared as named instances per backend kind:
//!
//! ```toml
//! [db]
//! path = "./data/nbsync.sqlite"
//!
//! [repos.directory.notes]
//! root = "/home/me/notes"
//!
//! [repos.git.main]
//! url = "git@github.com:me/notes.git"
//! branch = "main"
//!
//! [repos.s3.backup]
//! bucket = "my-notes"
//! prefix = "org/"
//! region = "eu-west-1"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::book_name::BookFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub repos: ReposConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// Where notebook exports are written during a push or merge.
    /// Defaults to the system temp directory.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReposConfig {
    #[serde(default)]
    pub directory: BTreeMap<String, DirectoryRepoConfig>,
    #[serde(default)]
    pub git: BTreeMap<String, GitRepoConfig>,
    #[serde(default)]
    pub s3: BTreeMap<String, S3RepoConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryRepoConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub format: BookFormat,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl DirectoryRepoConfig {
    pub fn url(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitRepoConfig {
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub format: BookFormat,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_author_name() -> String {
    "nbsync".to_string()
}
fn default_author_email() -> String {
    "nbsync@localhost".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3RepoConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub format: BookFormat,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3RepoConfig {
    pub fn url(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, prefix)
        }
    }
}

impl Config {
    /// Urls of every configured repository, in declaration-kind order.
    pub fn repo_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        urls.extend(self.repos.directory.values().map(|c| c.url()));
        urls.extend(self.repos.git.values().map(|c| c.url.clone()));
        urls.extend(self.repos.s3.values().map(|c| c.url()));
        urls
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    for (name, dir) in &config.repos.directory {
        if dir.root.as_os_str().is_empty() {
            anyhow::bail!("repos.directory.{}.root must not be empty", name);
        }
    }

    for (name, git) in &config.repos.git {
        if git.url.trim().is_empty() {
            anyhow::bail!("repos.git.{}.url must not be empty", name);
        }
        if git.branch.trim().is_empty() {
            anyhow::bail!("repos.git.{}.branch must not be empty", name);
        }
    }

    for (name, s3) in &config.repos.s3 {
        if s3.bucket.trim().is_empty() {
            anyhow::bail!("repos.s3.{}.bucket must not be empty", name);
        }
    }

    let mut seen = HashSet::new();
    for url in config.repo_urls() {
        if !seen.insert(url.clone()) {
            anyhow::bail!("Repository url configured twice: {}", url);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nbsync.toml");
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_parses_all_repo_kinds() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/nbsync.sqlite"

[repos.directory.notes]
root = "/srv/notes"
format = "md"

[repos.git.main]
url = "git@example.com:me/notes.git"

[repos.s3.backup]
bucket = "notes"
prefix = "/org/"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.repos.directory["notes"].format, BookFormat::Md);
        assert_eq!(config.repos.git["main"].branch, "main");
        assert_eq!(config.repos.s3["backup"].region, "us-east-1");
        assert_eq!(
            config.repo_urls(),
            vec![
                "file:///srv/notes".to_string(),
                "git@example.com:me/notes.git".to_string(),
                "s3://notes/org".to_string(),
            ]
        );
        assert!(config.sync.temp_dir.is_none());
    }

    #[test]
    fn test_rejects_duplicate_urls() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/nbsync.sqlite"

[repos.directory.a]
root = "/srv/notes"

[repos.directory.b]
root = "/srv/notes"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_rejects_empty_git_url() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/nbsync.sqlite"

[repos.git.main]
url = " "
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
