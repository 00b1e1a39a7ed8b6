//! Database module
//!
//! ```text
//! database/
//! ├── core/        # Foundation
//! │   ├── connection  # SQLite DatabaseConn wrapper
//! │   └── schema      # catalog schema definitions and management
//! │
//! └── catalog/     # Backup and restore records
//!     ├── backups     # BackupRecord, retention-managed
//!     └── restores    # RestoreRecord, never evicted
//! ```
//!
//! The target databases being dumped and restored are reached through the
//! connectors in [`crate::vault::connector`]; this module only holds the
//! SQLite plumbing they share with the catalog.

pub mod catalog;
pub mod core;

pub use catalog::{
    BackupCategory, BackupRecord, BackupRepository, CatalogDatabase, RestoreRecord,
    RestoreRepository,
};
pub use core::{DatabaseConn, SchemaDefinitions, SchemaManager, SchemaStatus, SCHEMA_VERSION};
