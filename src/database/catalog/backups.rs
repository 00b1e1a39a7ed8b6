//! Backup record repository
//!
//! Every deletion path goes through [`BackupRepository::delete`], which removes
//! the backing file together with the row.

use super::BackupCategory;
use crate::database::core::DatabaseConn;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A record from the `backups_backup` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct BackupRecord {
    pub id: i64,
    pub category: BackupCategory,
    /// Backup file path, relative to the media root (or absolute)
    pub file: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl BackupRecord {
    /// Resolve the backing file against the media root
    pub fn file_path(&self, media_root: &Path) -> PathBuf {
        media_root.join(&self.file)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let category: String = row.get(1)?;
        let created_at: String = row.get(3)?;
        Ok(BackupRecord {
            id: row.get(0)?,
            category: category.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
            })?,
            file: row.get(2)?,
            created_at: parse_timestamp(&created_at, 3)?,
            created_by: row.get(4)?,
        })
    }
}

/// Repository for backup records
pub struct BackupRepository<'a> {
    db: &'a DatabaseConn,
}

const SELECT_COLUMNS: &str = "SELECT id, type, file, created_at, created_by FROM backups_backup";

impl<'a> BackupRepository<'a> {
    /// Create a new backup repository
    pub fn new(db: &'a DatabaseConn) -> Self {
        Self { db }
    }

    /// Record a new backup created now
    pub fn insert(
        &self,
        category: BackupCategory,
        file: &str,
        created_by: &str,
    ) -> Result<BackupRecord> {
        self.insert_at(category, file, created_by, Utc::now())
    }

    /// Record a new backup with an explicit creation time
    pub fn insert_at(
        &self,
        category: BackupCategory,
        file: &str,
        created_by: &str,
        created_at: DateTime<Utc>,
    ) -> Result<BackupRecord> {
        self.db.conn.execute(
            "INSERT INTO backups_backup (type, file, created_at, created_by) VALUES (?1, ?2, ?3, ?4)",
            params![
                category.as_str(),
                file,
                format_timestamp(&created_at),
                created_by
            ],
        )?;
        let id = self.db.conn.last_insert_rowid();

        Ok(BackupRecord {
            id,
            category,
            file: file.to_string(),
            created_at,
            created_by: created_by.to_string(),
        })
    }

    /// Record a backup created now, reusing the record of the same category
    /// that already points at `file`
    ///
    /// Backup file names have minute resolution, so a second backup within the
    /// same minute overwrites the first file. One file maps to one record.
    pub fn insert_or_replace(
        &self,
        category: BackupCategory,
        file: &str,
        created_by: &str,
    ) -> Result<BackupRecord> {
        let created_at = Utc::now();
        let tx = self.db.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM backups_backup WHERE type = ?1 AND file = ?2",
                params![category.as_str(), file],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE backups_backup SET created_at = ?1, created_by = ?2 WHERE id = ?3",
                    params![format_timestamp(&created_at), created_by, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO backups_backup (type, file, created_at, created_by) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        category.as_str(),
                        file,
                        format_timestamp(&created_at),
                        created_by
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };
        tx.commit()?;

        Ok(BackupRecord {
            id,
            category,
            file: file.to_string(),
            created_at,
            created_by: created_by.to_string(),
        })
    }

    /// List the backups of one category, oldest first
    pub fn list(&self, category: BackupCategory) -> Result<Vec<BackupRecord>> {
        let mut stmt = self.db.conn.prepare(&format!(
            "{} WHERE type = ?1 ORDER BY created_at, id",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map([category.as_str()], BackupRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// List every backup, newest first
    pub fn list_all(&self) -> Result<Vec<BackupRecord>> {
        let mut stmt = self.db.conn.prepare(&format!(
            "{} ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map([], BackupRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Count the backups of one category
    pub fn count(&self, category: BackupCategory) -> Result<u64> {
        let count: u64 = self.db.conn.query_row(
            "SELECT COUNT(*) FROM backups_backup WHERE type = ?1",
            [category.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get a backup record by id
    pub fn get(&self, id: i64) -> Result<Option<BackupRecord>> {
        let result = self.db.conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_COLUMNS),
            [id],
            BackupRecord::from_row,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a backup record and its backing file
    ///
    /// The row is removed only if the file is gone afterwards; an already
    /// missing file is not an error.
    pub fn delete(&self, record: &BackupRecord, media_root: &Path) -> Result<()> {
        let tx = self.db.transaction()?;
        let deleted = tx.execute("DELETE FROM backups_backup WHERE id = ?1", [record.id])?;
        if deleted == 0 {
            return Err(Error::RecordNotFound { id: record.id });
        }

        let path = record.file_path(media_root);
        match std::fs::remove_file(&path) {
            Ok(()) => info!("Deleted backup file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Backup file {} was already missing", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a backup record by id, together with its backing file
    pub fn delete_by_id(&self, id: i64, media_root: &Path) -> Result<BackupRecord> {
        let record = self.get(id)?.ok_or(Error::RecordNotFound { id })?;
        self.delete(&record, media_root)?;
        Ok(record)
    }
}

pub(super) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // fixed width keeps lexical order equal to chronological order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, e.into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::catalog::CatalogDatabase;
    use chrono::Duration;

    #[test]
    fn test_insert_and_list_ordered() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        let repo = db.backups();
        let now = Utc::now();

        repo.insert_at(BackupCategory::Database, "backups/b.sql", "alice", now)
            .unwrap();
        repo.insert_at(
            BackupCategory::Database,
            "backups/a.sql",
            "alice",
            now - Duration::minutes(5),
        )
        .unwrap();
        repo.insert_at(BackupCategory::Media, "backups/m.zip", "bob", now)
            .unwrap();

        let db_backups = repo.list(BackupCategory::Database).unwrap();
        assert_eq!(db_backups.len(), 2);
        assert_eq!(db_backups[0].file, "backups/a.sql");
        assert_eq!(db_backups[1].file, "backups/b.sql");
        assert_eq!(repo.count(BackupCategory::Media).unwrap(), 1);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_get_roundtrips_timestamp() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        let repo = db.backups();
        let record = repo
            .insert(BackupCategory::Database, "backups/x.sql", "carol")
            .unwrap();

        let loaded = repo.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.created_by, "carol");
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            record.created_at.timestamp_micros()
        );
        assert!(repo.get(record.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_insert_or_replace_reuses_record_for_same_file() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        let repo = db.backups();

        let first = repo
            .insert_or_replace(BackupCategory::Database, "backups/same.sql", "alice")
            .unwrap();
        let second = repo
            .insert_or_replace(BackupCategory::Database, "backups/same.sql", "bob")
            .unwrap();
        repo.insert_or_replace(BackupCategory::Media, "backups/same.sql", "bob")
            .unwrap();

        assert_eq!(first.id, second.id);
        let records = repo.list(BackupCategory::Database).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].created_by, "bob");
        assert_eq!(repo.count(BackupCategory::Media).unwrap(), 1);
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("backups")).unwrap();
        std::fs::write(dir.path().join("backups/x.sql"), "SELECT 1;\n").unwrap();

        let db = CatalogDatabase::open_in_memory().unwrap();
        let repo = db.backups();
        let record = repo
            .insert(BackupCategory::Database, "backups/x.sql", "dave")
            .unwrap();

        repo.delete(&record, dir.path()).unwrap();
        assert!(!dir.path().join("backups/x.sql").exists());
        assert!(repo.get(record.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = CatalogDatabase::open_in_memory().unwrap();
        let repo = db.backups();
        let record = repo
            .insert(BackupCategory::Media, "backups/gone.zip", "erin")
            .unwrap();

        repo.delete_by_id(record.id, dir.path()).unwrap();
        assert_eq!(repo.count(BackupCategory::Media).unwrap(), 0);
        assert!(matches!(
            repo.delete_by_id(record.id, dir.path()),
            Err(Error::RecordNotFound { .. })
        ));
    }
}
