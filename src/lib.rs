#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! sqlvault - logical backup and restore for relational databases
//!
//! sqlvault dumps the row data of a SQLite or PostgreSQL database into a
//! portable, replayable SQL text file, restores such a file into a live
//! database, keeps a small rotating set of backups per category, and
//! snapshots a media directory into a zip archive. It can be used as both a
//! command-line application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | SQLite dump/restore, catalog, retention | `rusqlite` |
//! | `postgres` | PostgreSQL connector | `sqlx`, `tokio` |
//! | `media` | Media root snapshots | `zip`, `walkdir` |
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | Command-line binary | All above + `clap`, `indicatif` |
//!
//! ```toml
//! # SQLite only, no binary
//! sqlvault = { version = "0.3", default-features = false }
//!
//! # Library with both dialects
//! sqlvault = { version = "0.3", default-features = false, features = ["postgres"] }
//! ```
//!
//! # Architecture
//!
//! - **[`vault`]**: dialect catalog, exclusion policy, connectors, dump and
//!   restore engines, retention, operation lock, media snapshot and the
//!   [`Vault`] facade
//! - **[`database`]**: SQLite connection management and the backup catalog
//! - **[`config`]**: configuration loading
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sqlvault::vault::{DumpEngine, ExclusionPolicy, RestoreEngine, SqliteConnector};
//!
//! let mut connector = SqliteConnector::new("db.sqlite3");
//! let dump = DumpEngine::new(ExclusionPolicy::default(), "media/backups", "media");
//! let report = dump.create_backup(&mut connector)?;
//!
//! let restore = RestoreEngine::new(ExclusionPolicy::default());
//! let outcome = restore.restore_backup(&mut connector, &report.path)?;
//! assert!(outcome.is_clean());
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod output;
pub mod vault;

pub use config::{format_size, VaultConfig};
pub use error::{Error, Result};
pub use output::OutputFormat;

pub use database::{
    BackupCategory, BackupRecord, BackupRepository, CatalogDatabase, DatabaseConn,
    RestoreRecord, RestoreRepository, SchemaManager, SchemaStatus, SCHEMA_VERSION,
};

pub use vault::{
    select_connector, BackupOutcome, Connector, Dialect, DumpEngine, DumpReport, ExclusionPolicy,
    OperationLock, RestoreEngine, RestoreOutcome, RestoreReport, RetentionManager, Vault,
};

#[cfg(feature = "media")]
pub use vault::{MediaReport, MediaSnapshot};
