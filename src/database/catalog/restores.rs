//! Restore record repository

use super::backups::{format_timestamp, parse_timestamp};
use super::BackupCategory;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

/// A record from the `backups_restore` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct RestoreRecord {
    pub id: i64,
    pub category: BackupCategory,
    pub file: String,
    pub restored_at: DateTime<Utc>,
    pub restored_by: String,
}

/// Repository for restore records
pub struct RestoreRepository<'a> {
    conn: &'a Connection,
}

impl<'a> RestoreRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a restore that is about to run
    pub fn insert(
        &self,
        category: BackupCategory,
        file: &str,
        restored_by: &str,
    ) -> Result<RestoreRecord> {
        let restored_at = Utc::now();
        self.conn.execute(
            "INSERT INTO backups_restore (type, file, restored_at, restored_by) VALUES (?1, ?2, ?3, ?4)",
            params![
                category.as_str(),
                file,
                format_timestamp(&restored_at),
                restored_by
            ],
        )?;

        Ok(RestoreRecord {
            id: self.conn.last_insert_rowid(),
            category,
            file: file.to_string(),
            restored_at,
            restored_by: restored_by.to_string(),
        })
    }

    /// List every restore, newest first
    pub fn list(&self) -> Result<Vec<RestoreRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type, file, restored_at, restored_by FROM backups_restore ORDER BY restored_at DESC, id DESC",
        )?;
        let records = stmt
            .query_map([], |row| {
                let category: String = row.get(1)?;
                let restored_at: String = row.get(3)?;
                Ok(RestoreRecord {
                    id: row.get(0)?,
                    category: category.parse().map_err(|e: String| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            e.into(),
                        )
                    })?,
                    file: row.get(2)?,
                    restored_at: parse_timestamp(&restored_at, 3)?,
                    restored_by: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::catalog::CatalogDatabase;

    #[test]
    fn test_insert_and_list() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        let repo = db.restores();

        repo.insert(BackupCategory::Database, "uploads/backup.sql", "alice")
            .unwrap();
        repo.insert(BackupCategory::Media, "uploads/media.zip", "bob")
            .unwrap();

        let records = repo.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].restored_by, "bob");
        assert_eq!(records[1].category, BackupCategory::Database);
    }
}
