//! # notebook-sync
//!
//! Keeps a local collection of text notebooks in sync with remote
//! repositories (plain directories, Git, S3).
//!
//! Every cycle groups local notebooks and remote copies by notebook name
//! ("namesakes"), classifies each namesake into exactly one
//! [`SyncStatus`](status::SyncStatus) and performs the one corrective
//! action for it: pull, push, unlink, report or merge.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Repositories │──▶│   Collect    │──▶│    Group     │
//! │ Dir/Git/S3   │   │  revisions   │   │  + classify  │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!        ▲                                     ▼
//!        │           ┌──────────────┐   ┌──────────────┐
//!        └───────────│   Library    │◀──│  Reconcile   │
//!                    │ SQLite store │   │ (+ two-way)  │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nbsync init                       # create database, register repos
//! nbsync add todo --file todo.org   # add a local notebook
//! nbsync sync                       # one reconciliation cycle
//! nbsync notebooks                  # show links and last actions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`book_name`] | Notebook names, formats and repository paths |
//! | [`traits`] | Repository traits and registry |
//! | [`repo_dir`] | Directory repository |
//! | [`repo_git`] | Git repository (two-way) |
//! | [`repo_s3`] | S3 repository |
//! | [`store`] | Local notebook storage |
//! | [`library`] | Storage facade used by the engine |
//! | [`collect`] | Remote revision collection |
//! | [`namesake`] | Grouping by notebook name |
//! | [`status`] | Sync status classification |
//! | [`two_way`] | Two-way merge handling |
//! | [`sync`] | Reconciliation cycle |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod book_name;
pub mod collect;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod migrate;
pub mod models;
pub mod namesake;
pub mod notebooks;
pub mod repo_dir;
pub mod repo_git;
pub mod repo_s3;
pub mod repos;
pub mod status;
pub mod store;
pub mod sync;
pub mod sync_cmd;
pub mod traits;
pub mod two_way;
