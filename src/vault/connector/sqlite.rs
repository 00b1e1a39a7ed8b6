//! SQLite connector

use super::{Connector, StatementSink};
use crate::config::VaultConfig;
use crate::database::core::DatabaseConn;
use crate::error::{Error, Result};
use crate::vault::dialect::{idempotent_create, Dialect};
use crate::vault::statement::single_line;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Connector for a SQLite database file
pub struct SqliteConnector {
    path: PathBuf,
    db: Option<DatabaseConn>,
}

impl SqliteConnector {
    /// Create a connector for the database file at `path`; nothing is opened yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: None,
        }
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        if config.database_name.trim().is_empty() {
            return Err(Error::config("database_name must name the SQLite file"));
        }
        Ok(Self::new(&config.database_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&mut self) -> Result<()> {
        let db = DatabaseConn::open_target(&self.path).map_err(|e| Error::Connectivity {
            message: format!("cannot open {}: {}", self.path.display(), e),
        })?;
        self.db = Some(db);
        Ok(())
    }

    fn db(&mut self) -> Result<&DatabaseConn> {
        if self.db.is_none() {
            self.connect()?;
        }
        self.db.as_ref().ok_or_else(|| Error::Connectivity {
            message: format!("no connection to {}", self.path.display()),
        })
    }

    fn columns(&mut self, table: &str) -> Result<Vec<String>> {
        let db = self.db()?;
        let mut stmt = db
            .conn
            .prepare(Dialect::Sqlite.statements().list_columns)?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }
}

impl Connector for SqliteConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn ensure_connected(&mut self) -> Result<()> {
        let usable = self.db.as_ref().map(|db| db.is_usable()).unwrap_or(false);
        if !usable {
            if self.db.is_some() {
                info!("SQLite connection to {} unusable, reconnecting", self.path.display());
            }
            self.db = None;
            self.connect()?;
        }
        Ok(())
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        let db = self.db()?;
        let mut stmt = db.conn.prepare(Dialect::Sqlite.statements().list_tables)?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tables)
    }

    fn table_schema(&mut self, table: &str) -> Result<Option<String>> {
        let Some(query) = Dialect::Sqlite.statements().dump_schema else {
            return Ok(None);
        };
        let db = self.db()?;
        let result = db
            .conn
            .query_row(query, [table], |row| row.get::<_, String>(0));

        match result {
            Ok(sql) => Ok(Some(single_line(&idempotent_create(&sql)))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stream_inserts(&mut self, table: &str, sink: &mut StatementSink<'_>) -> Result<u64> {
        let columns = self.columns(table)?;
        if columns.is_empty() {
            return Ok(0);
        }
        let sql = Dialect::Sqlite.select_inserts_sql(table, &columns);
        debug!("streaming rows of {}", table);

        let db = self.db()?;
        let mut stmt = db.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            let statement: String = row.get(0)?;
            sink(&statement)?;
            count += 1;
        }
        Ok(count)
    }

    fn sequence_reset(&mut self, _table: &str) -> Result<Option<String>> {
        // AUTOINCREMENT counters live in sqlite_sequence and follow the inserted ids
        Ok(None)
    }

    fn referencing_tables(&mut self, _table: &str) -> Result<Vec<String>> {
        // foreign keys are not enforced on restore connections
        Ok(vec![])
    }

    fn clear_table(&mut self, table: &str, cascade: bool) -> Result<()> {
        let sql = Dialect::Sqlite.clear_table_sql(table, cascade);
        let db = self.db()?;
        db.execute(&sql)?;
        Ok(())
    }

    fn execute_isolated(&mut self, statement: &str) -> Result<()> {
        let db = self.db()?;
        let tx = db.transaction()?;
        tx.execute_batch(statement)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::dialect::quote_ident;

    fn count_rows(connector: &mut SqliteConnector, table: &str) -> u64 {
        let db = connector.db().unwrap();
        db.conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn connector_with(sql: &str) -> (SqliteConnector, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let db = DatabaseConn::open_target(&path).unwrap();
        db.conn.execute_batch(sql).unwrap();
        (SqliteConnector::new(path), dir)
    }

    #[test]
    fn test_list_tables_in_name_order() {
        let (mut connector, _dir) = connector_with(
            "CREATE TABLE zeta (id INTEGER PRIMARY KEY);
             CREATE TABLE alpha (id INTEGER PRIMARY KEY AUTOINCREMENT);
             CREATE INDEX idx_alpha ON alpha(id);",
        );
        connector.ensure_connected().unwrap();
        let tables = connector.list_tables().unwrap();
        assert_eq!(tables, vec!["alpha", "sqlite_sequence", "zeta"]);
    }

    #[test]
    fn test_table_schema_is_idempotent_single_line() {
        let (mut connector, _dir) = connector_with(
            "CREATE TABLE note (\n    id INTEGER PRIMARY KEY,\n    body TEXT\n);",
        );
        let schema = connector.table_schema("note").unwrap().unwrap();
        assert_eq!(
            schema,
            "CREATE TABLE IF NOT EXISTS note (id INTEGER PRIMARY KEY, body TEXT)"
        );
        assert_eq!(connector.table_schema("missing").unwrap(), None);
    }

    #[test]
    fn test_stream_inserts_quotes_values() {
        let (mut connector, _dir) = connector_with(
            "CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT, price REAL, data BLOB);
             INSERT INTO item VALUES (1, 'it''s', 2.5, x'00ff');
             INSERT INTO item VALUES (2, NULL, NULL, NULL);",
        );
        let mut statements = Vec::new();
        let count = connector
            .stream_inserts("item", &mut |s: &str| -> Result<()> {
                statements.push(s.to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            statements[0],
            "INSERT INTO \"item\" (\"id\",\"name\",\"price\",\"data\") VALUES (1,'it''s',2.5,X'00FF')"
        );
        assert_eq!(
            statements[1],
            "INSERT INTO \"item\" (\"id\",\"name\",\"price\",\"data\") VALUES (2,NULL,NULL,NULL)"
        );
    }

    #[test]
    fn test_execute_isolated_rolls_back_failure() {
        let (mut connector, _dir) =
            connector_with("CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT NOT NULL);");

        connector
            .execute_isolated("INSERT INTO item VALUES (1, 'a');")
            .unwrap();
        assert!(connector
            .execute_isolated("INSERT INTO item VALUES (1, 'dup');")
            .is_err());
        assert!(connector
            .execute_isolated("INSERT INTO item VALUES (2, 'b'); INSERT INTO item VALUES (3, NULL);")
            .is_err());

        assert_eq!(count_rows(&mut connector, "item"), 1);
    }

    #[test]
    fn test_clear_table() {
        let (mut connector, _dir) = connector_with(
            "CREATE TABLE item (id INTEGER PRIMARY KEY);
             INSERT INTO item VALUES (1), (2);",
        );
        connector.clear_table("item", true).unwrap();
        assert_eq!(count_rows(&mut connector, "item"), 0);
    }

    #[test]
    fn test_reconnects_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let mut connector = SqliteConnector::new(dir.path().join("fresh.db"));
        connector.ensure_connected().unwrap();
        connector.ensure_connected().unwrap();
        assert!(connector.list_tables().unwrap().is_empty());
    }

    #[test]
    fn test_unopenable_path_is_connectivity_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut connector = SqliteConnector::new(dir.path().join("missing/dir/app.db"));
        assert!(matches!(
            connector.ensure_connected(),
            Err(Error::Connectivity { .. })
        ));
    }
}
