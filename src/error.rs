//! Errors callers need to tell apart from ordinary I/O failures.
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! I/O boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A two-way merge completed but left conflicts. The local content was
    /// preserved on a side branch.
    #[error("Merge conflict in {repo}; saved to temporary branch.")]
    MergeConflict { repo: String },

    #[error("No backend configured for repository {url}")]
    UnknownRepo { url: String },

    #[error("Notebook '{name}' has no repository link")]
    MissingLink { name: String },

    #[error("Notebook '{name}' has never been synced")]
    MissingSyncedRook { name: String },
}
