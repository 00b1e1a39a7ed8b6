//! Database connection management
//!
//! This module provides the SQLite connection wrapper shared by the backup
//! catalog and by the SQLite connector.

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// How long a statement waits on a locked SQLite database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Core database connection wrapper
///
/// `DatabaseConn` provides a thin wrapper around SQLite connections,
/// handling both file-based and in-memory databases with consistent
/// configuration and error handling.
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open a catalog-style database at the specified path
    ///
    /// If the path is `None`, an in-memory database is created.
    /// The database is switched to WAL mode, which is only appropriate for
    /// files sqlvault owns.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };

        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Open a user database without changing its persistent settings
    ///
    /// Only connection-local pragmas are applied; foreign key enforcement stays
    /// off so the restore replay is not sensitive to table order.
    pub fn open_target(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(DatabaseConn { conn })
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(None)
    }

    /// Configure the database with optimal settings
    fn configure(&self) -> Result<()> {
        // Enable WAL mode for better concurrent read/write performance
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        self.conn.execute("PRAGMA synchronous=NORMAL", [])?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        self.conn.execute("PRAGMA foreign_keys=ON", [])?;

        Ok(())
    }

    /// Check that the connection still answers queries
    pub fn is_usable(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> Result<usize> {
        Ok(self.conn.execute(sql, [])?)
    }

    /// Begin an unchecked transaction
    ///
    /// The transaction rolls back when dropped without a commit.
    pub fn transaction(&self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = DatabaseConn::open_in_memory();
        assert!(db.is_ok());
        assert!(db.unwrap().is_usable());
    }

    #[test]
    fn test_open_target_leaves_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let db = DatabaseConn::open_target(&path).unwrap();
        let mode: String = db
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "delete");
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let db = DatabaseConn::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        {
            let tx = db.transaction().unwrap();
            tx.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        }
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
