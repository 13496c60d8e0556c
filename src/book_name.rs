//! Notebook naming: mapping between notebook names and repository paths.
//!
//! A notebook file is `<name>.<ext>`, where the extension selects the
//! [`BookFormat`]. Sub-directories are part of the name, so
//! `journal/2024.org` is the notebook `journal/2024`.

use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    #[default]
    Org,
    #[serde(alias = "markdown")]
    Md,
}

impl BookFormat {
    pub fn extension(self) -> &'static str {
        match self {
            BookFormat::Org => "org",
            BookFormat::Md => "md",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "org" => Some(BookFormat::Org),
            "md" => Some(BookFormat::Md),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookName {
    pub name: String,
    pub format: BookFormat,
}

impl BookName {
    /// Parses a repo-relative path such as `notes/todo.org`.
    pub fn from_repo_relative_path(path: &str) -> Result<Self> {
        let path = path.trim_start_matches('/');
        let Some((name, ext)) = path.rsplit_once('.') else {
            bail!("Not a notebook file (no extension): {}", path);
        };
        let Some(format) = BookFormat::from_extension(ext) else {
            bail!("Not a notebook file (unsupported extension): {}", path);
        };
        if name.is_empty() || name.ends_with('/') {
            bail!("Not a notebook file (empty name): {}", path);
        }
        Ok(Self {
            name: name.to_string(),
            format,
        })
    }

    /// Whether a repo-relative path names a notebook file.
    pub fn is_supported(path: &str) -> bool {
        Self::from_repo_relative_path(path).is_ok()
    }
}

/// Repo-relative path a fresh push of `name` lands on.
pub fn repo_relative_path(name: &str, format: BookFormat) -> String {
    format!("{}.{}", name, format.extension())
}

/// Full uri of a file inside a repository.
pub fn rook_uri(repo_url: &str, relative_path: &str) -> String {
    format!(
        "{}/{}",
        repo_url.trim_end_matches('/'),
        relative_path.trim_start_matches('/')
    )
}

/// Recovers the repo-relative path from a rook uri.
pub fn repo_relative_path_of(repo_url: &str, rook_uri: &str) -> Result<String> {
    let base = repo_url.trim_end_matches('/');
    match rook_uri.strip_prefix(base) {
        Some(rest) if rest.starts_with('/') && rest.len() > 1 => Ok(rest[1..].to_string()),
        _ => bail!("'{}' is not inside repository '{}'", rook_uri, repo_url),
    }
}
