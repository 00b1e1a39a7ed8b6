//! Catalog schema management
//!
//! This module provides schema definitions and management for the catalog
//! database that records backups and restores.

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
/// Increment this when making breaking schema changes
pub const SCHEMA_VERSION: u32 = 1;

/// Schema definitions for all tables in the catalog database
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    /// SQL for creating the meta table (tracks schema version and global metadata)
    pub const META_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS sqlvault_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// SQL for creating the backup record table
    pub const BACKUP_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS backups_backup (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL CHECK (type IN ('database', 'media')),
            file TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL
        );
    "#;

    /// SQL for creating the restore record table
    pub const RESTORE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS backups_restore (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL CHECK (type IN ('database', 'media')),
            file TEXT NOT NULL,
            restored_at TEXT NOT NULL,
            restored_by TEXT NOT NULL
        );
    "#;

    pub const INDEXES: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_backups_backup_type_created ON backups_backup(type, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_backups_restore_restored ON backups_restore(restored_at)",
    ];
}

/// Schema manager for the catalog database
///
/// Handles schema initialization, version checking, and migrations.
pub struct SchemaManager<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaManager<'a> {
    /// Create a new schema manager for the given connection
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Initialize the database schema
    ///
    /// Creates all tables and indexes if they don't exist.
    /// Sets the schema version in the meta table.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute(SchemaDefinitions::META_TABLE, [])?;
        self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?;

        self.conn.execute(SchemaDefinitions::BACKUP_TABLE, [])?;
        self.conn.execute(SchemaDefinitions::RESTORE_TABLE, [])?;

        for index_sql in SchemaDefinitions::INDEXES {
            self.conn.execute(index_sql, [])?;
        }

        Ok(())
    }

    /// Check the current schema status
    pub fn check_status(&self) -> Result<SchemaStatus> {
        let meta_exists: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sqlvault_meta'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if meta_exists == 0 {
            return Ok(SchemaStatus::NotInitialized);
        }

        let current_version = self.get_schema_version();

        if current_version == SCHEMA_VERSION {
            if self.verify_integrity()? {
                Ok(SchemaStatus::Current)
            } else {
                Ok(SchemaStatus::Corrupted)
            }
        } else if current_version < SCHEMA_VERSION {
            Ok(SchemaStatus::NeedsMigration {
                from: current_version,
                to: SCHEMA_VERSION,
            })
        } else {
            // Catalog written by a newer sqlvault
            Ok(SchemaStatus::Incompatible {
                database_version: current_version,
                required_version: SCHEMA_VERSION,
            })
        }
    }

    /// Get the current schema version from the database, 0 when unreadable
    fn get_schema_version(&self) -> u32 {
        self.get_meta("schema_version")
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Verify schema integrity by checking required tables exist
    fn verify_integrity(&self) -> Result<bool> {
        let required_tables = ["sqlvault_meta", "backups_backup", "backups_restore"];

        for table in required_tables {
            let exists: i32 = self.conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )?;

            if exists == 0 {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Set a metadata value
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sqlvault_meta (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))",
            [key, value],
        )?;
        Ok(())
    }

    /// Get a metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM sqlvault_meta WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Status of the database schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Database is not initialized (fresh database)
    NotInitialized,

    /// Schema is current and valid
    Current,

    /// Schema needs migration from an older version
    NeedsMigration { from: u32, to: u32 },

    /// Database is from a newer version (incompatible)
    Incompatible {
        database_version: u32,
        required_version: u32,
    },

    /// Schema is corrupted (missing tables)
    Corrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_not_initialized() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);

        assert_eq!(
            manager.check_status().unwrap(),
            SchemaStatus::NotInitialized
        );
    }

    #[test]
    fn test_schema_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);

        manager.initialize().unwrap();
        manager.initialize().unwrap();

        assert_eq!(manager.check_status().unwrap(), SchemaStatus::Current);
    }

    #[test]
    fn test_schema_corrupted() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        conn.execute("DROP TABLE backups_restore", []).unwrap();

        assert_eq!(manager.check_status().unwrap(), SchemaStatus::Corrupted);
    }

    #[test]
    fn test_schema_incompatible() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        manager.set_meta("schema_version", "99").unwrap();

        assert_eq!(
            manager.check_status().unwrap(),
            SchemaStatus::Incompatible {
                database_version: 99,
                required_version: SCHEMA_VERSION,
            }
        );
    }

    #[test]
    fn test_meta_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();

        assert_eq!(manager.get_meta("missing").unwrap(), None);
        manager.set_meta("last_backup", "backup_01-01-2026-10:00.sql").unwrap();
        assert_eq!(
            manager.get_meta("last_backup").unwrap().as_deref(),
            Some("backup_01-01-2026-10:00.sql")
        );
    }
}
