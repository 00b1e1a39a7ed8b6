//! Backup catalog storage
//!
//! The catalog records every backup and restore performed through sqlvault:
//! - Backup records (category, file, creation time, creator) - subject to retention
//! - Restore records (category, file, restore time, actor) - never evicted
//!
//! The catalog lives in its own SQLite file inside the backup root so it is never
//! part of the database being dumped or restored.

mod backups;
mod restores;

pub use backups::{BackupRecord, BackupRepository};
pub use restores::{RestoreRecord, RestoreRepository};

use crate::database::core::{DatabaseConn, SchemaManager, SchemaStatus};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Kind of data a backup or restore covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupCategory {
    Database,
    Media,
}

impl BackupCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupCategory::Database => "database",
            BackupCategory::Media => "media",
        }
    }
}

impl fmt::Display for BackupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "database" | "db" => Ok(BackupCategory::Database),
            "media" => Ok(BackupCategory::Media),
            _ => Err(format!(
                "Unknown backup category '{}'. Valid categories: database, media",
                s
            )),
        }
    }
}

/// Catalog database holding backup and restore records (SQLite backend)
pub struct CatalogDatabase {
    db: DatabaseConn,
}

impl CatalogDatabase {
    /// Open the catalog at the specified path
    ///
    /// A missing or outdated schema is (re)created in place; records are kept
    /// since every table is created with `IF NOT EXISTS`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = DatabaseConn::open(Some(path))?;
        let schema = SchemaManager::new(&db.conn);

        match schema.check_status()? {
            SchemaStatus::Current => {}
            SchemaStatus::NotInitialized => {
                info!("Initializing backup catalog at {}", path.display());
                schema.initialize()?;
            }
            SchemaStatus::NeedsMigration { from, to } => {
                info!("Backup catalog needs migration from v{} to v{}", from, to);
                schema.initialize()?;
            }
            SchemaStatus::Corrupted => {
                info!("Backup catalog is missing tables, recreating them");
                schema.initialize()?;
            }
            SchemaStatus::Incompatible {
                database_version,
                required_version,
            } => {
                return Err(Error::config(format!(
                    "backup catalog {} has schema v{}, this build supports v{}",
                    path.display(),
                    database_version,
                    required_version
                )));
            }
        }

        Ok(Self { db })
    }

    /// Create an in-memory catalog (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let db = DatabaseConn::open_in_memory()?;
        let schema = SchemaManager::new(&db.conn);
        schema.initialize()?;
        Ok(Self { db })
    }

    /// Get a reference to the backup record repository
    pub fn backups(&self) -> BackupRepository<'_> {
        BackupRepository::new(&self.db)
    }

    /// Get a reference to the restore record repository
    pub fn restores(&self) -> RestoreRepository<'_> {
        RestoreRepository::new(&self.db.conn)
    }
}
