//! Core data models used throughout notebook-sync.
//!
//! These types represent the local notebooks, configured repositories and
//! remote revisions that flow through a sync cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend kind of a configured repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Directory,
    Git,
    S3,
}

impl RepoType {
    pub fn as_str(self) -> &'static str {
        match self {
            RepoType::Directory => "directory",
            RepoType::Git => "git",
            RepoType::S3 => "s3",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "directory" => Some(RepoType::Directory),
            "git" => Some(RepoType::Git),
            "s3" => Some(RepoType::S3),
            _ => None,
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A configured sync target as registered in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repo {
    pub id: i64,
    pub repo_type: RepoType,
    pub url: String,
}

/// An observed, versioned copy of a notebook inside one repository.
///
/// `uri` is always `<repo url>/<repo-relative path>`, which lets the
/// relative path be recovered without asking the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedRook {
    pub repo_id: i64,
    pub repo_type: RepoType,
    pub repo_uri: String,
    pub uri: String,
    pub revision: String,
    pub mtime: i64,
}

/// A remote file as reported by a backend, before it is tied to a [`Repo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBook {
    pub path: String,
    pub revision: String,
    pub mtime: i64,
}

/// A local notebook row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub is_modified: bool,
    pub is_dummy: bool,
    pub last_action: Option<BookAction>,
}

/// A local notebook joined with its link and last synced revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookView {
    pub book: Book,
    pub link_repo: Option<Repo>,
    pub synced_to: Option<VersionedRook>,
}

impl BookView {
    pub fn has_link(&self) -> bool {
        self.link_repo.is_some()
    }

    pub fn has_sync(&self) -> bool {
        self.synced_to.is_some()
    }

    pub fn is_dummy(&self) -> bool {
        self.book.is_dummy
    }

    pub fn is_modified(&self) -> bool {
        self.book.is_modified
    }

    pub fn last_action_was_error(&self) -> bool {
        matches!(
            self.book.last_action,
            Some(BookAction {
                kind: BookActionKind::Error,
                ..
            })
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookActionKind {
    Info,
    Error,
}

impl BookActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BookActionKind::Info => "info",
            BookActionKind::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(BookActionKind::Info),
            "error" => Some(BookActionKind::Error),
            _ => None,
        }
    }
}

/// Outcome of processing one namesake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookAction {
    pub kind: BookActionKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl BookAction {
    pub fn for_now(kind: BookActionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::for_now(BookActionKind::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::for_now(BookActionKind::Error, message)
    }

    pub fn is_error(&self) -> bool {
        self.kind == BookActionKind::Error
    }
}
