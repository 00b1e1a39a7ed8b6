//! Restore engine
//!
//! A restore runs in three steps:
//!
//! - validate: the whole dump is scanned before anything is touched, so an
//!   unreadable or truncated dump fails with [`Error::CorruptDump`] and leaves
//!   the database as it was;
//! - clear: every retained table is emptied; a table that cannot be cleared
//!   is recorded and the next one is tried;
//! - replay: each statement runs in its own transaction; a failing statement
//!   is rolled back and replay continues. Failed statements are retried in
//!   further passes until a pass applies none of them; what still fails is
//!   recorded.
//!
//! Table and statement failures end up in the [`RestoreReport`]; the caller
//! decides what a report with failures means.

use crate::error::Result;
use crate::vault::connector::Connector;
use crate::vault::dump::TableFailure;
use crate::vault::exclusion::ExclusionPolicy;
use crate::vault::statement::StatementReader;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Longest statement text kept in a [`StatementFailure`]
pub const STATEMENT_PREVIEW_CHARS: usize = 256;

/// A dump statement that failed during replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct StatementFailure {
    /// 1-based line in the dump where the statement starts
    pub line: usize,
    /// Statement text, shortened to [`STATEMENT_PREVIEW_CHARS`]
    pub statement: String,
    pub error: String,
}

/// Outcome of [`RestoreEngine::restore_backup`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub skipped_tables: Vec<String>,
    pub cleared_tables: Vec<String>,
    pub failed_clears: Vec<TableFailure>,
    pub applied_statements: u64,
    /// Statements that failed at first and applied on a later pass
    pub deferred_statements: u64,
    pub failed_statements: Vec<StatementFailure>,
}

impl RestoreReport {
    /// No table failed to clear and every statement applied
    pub fn is_clean(&self) -> bool {
        self.failed_clears.is_empty() && self.failed_statements.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failed_clears.len() + self.failed_statements.len()
    }
}

/// Clears a database and replays a dump into it
pub struct RestoreEngine {
    policy: ExclusionPolicy,
}

impl RestoreEngine {
    pub fn new(policy: ExclusionPolicy) -> Self {
        Self { policy }
    }

    pub fn restore_backup<C: Connector + ?Sized>(
        &self,
        connector: &mut C,
        dump_file: &Path,
    ) -> Result<RestoreReport> {
        let total = validate_dump(dump_file)?;
        info!(
            "Restoring {} ({} statements)",
            dump_file.display(),
            total
        );

        connector.ensure_connected()?;
        let mut report = RestoreReport::default();

        self.clear_tables(connector, &mut report)?;
        replay(connector, dump_file, &mut report)?;

        info!(
            "Restore finished: {} tables cleared, {} statements applied, {} failures",
            report.cleared_tables.len(),
            report.applied_statements,
            report.failure_count()
        );
        Ok(report)
    }

    fn clear_tables<C: Connector + ?Sized>(
        &self,
        connector: &mut C,
        report: &mut RestoreReport,
    ) -> Result<()> {
        for table in connector.list_tables()? {
            if self.policy.is_excluded(&table) {
                debug!("not clearing excluded table {}", table);
                report.skipped_tables.push(table);
                continue;
            }

            // a cascade must never reach an excluded table, at any depth
            let cascade = match connector.referencing_tables(&table) {
                Ok(referencing) => !referencing.iter().any(|t| self.policy.is_excluded(t)),
                Err(e) => {
                    debug!("cannot list tables referencing {}: {}", table, e);
                    false
                }
            };

            match connector.clear_table(&table, cascade) {
                Ok(()) => report.cleared_tables.push(table),
                Err(e) => {
                    warn!("Failed to clear table {}: {}", table, e);
                    report.failed_clears.push(TableFailure {
                        table,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Scan a dump end to end; returns its statement count
pub fn validate_dump(path: &Path) -> Result<usize> {
    let mut count = 0;
    for statement in StatementReader::open(path)? {
        statement?;
        count += 1;
    }
    Ok(count)
}

fn replay<C: Connector + ?Sized>(
    connector: &mut C,
    dump_file: &Path,
    report: &mut RestoreReport,
) -> Result<()> {
    let mut pending = Vec::new();
    for statement in StatementReader::open(dump_file)? {
        let statement = statement?;
        match connector.execute_isolated(&statement.text) {
            Ok(()) => report.applied_statements += 1,
            Err(e) => {
                debug!("Statement at line {} failed: {}", statement.line, e);
                pending.push((statement, e.to_string()));
            }
        }
    }

    // rows whose foreign keys point at later tables succeed once those are in
    while !pending.is_empty() {
        let before = pending.len();
        let mut still_failing = Vec::with_capacity(before);
        for (statement, _) in pending {
            match connector.execute_isolated(&statement.text) {
                Ok(()) => {
                    report.applied_statements += 1;
                    report.deferred_statements += 1;
                }
                Err(e) => still_failing.push((statement, e.to_string())),
            }
        }
        pending = still_failing;
        if pending.len() == before {
            break;
        }
    }

    for (statement, error) in pending {
        warn!("Statement at line {} failed: {}", statement.line, error);
        report.failed_statements.push(StatementFailure {
            line: statement.line,
            statement: preview(&statement.text),
            error,
        });
    }
    Ok(())
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(STATEMENT_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::DatabaseConn;
    use crate::error::Error;
    use crate::vault::connector::SqliteConnector;
    use crate::vault::dump::DumpEngine;

    const SCHEMA: &str = "CREATE TABLE shop_item (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, price REAL, data BLOB);
         CREATE TABLE shop_tag (id INTEGER PRIMARY KEY, item_id INTEGER REFERENCES shop_item(id), label TEXT);
         CREATE TABLE backups_restore (id INTEGER PRIMARY KEY, file TEXT);
         CREATE TABLE django_session (session_key TEXT PRIMARY KEY, data TEXT);";

    fn open(path: &Path) -> DatabaseConn {
        DatabaseConn::open_target(path).unwrap()
    }

    fn rows(db: &DatabaseConn, sql: &str) -> Vec<String> {
        let mut stmt = db.conn.prepare(sql).unwrap();
        let mut values: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        values.sort();
        values
    }

    const ITEM_ROWS: &str =
        "SELECT id || '|' || name || '|' || quote(price) || '|' || quote(data) FROM shop_item";

    fn dump(dir: &Path, source: &Path) -> std::path::PathBuf {
        let engine = DumpEngine::new(ExclusionPolicy::default(), dir.join("backups"), dir);
        engine
            .create_backup(&mut SqliteConnector::new(source))
            .unwrap()
            .path
    }

    fn seed_source(path: &Path) {
        open(path)
            .conn
            .execute_batch(&format!(
                "{SCHEMA}
                 INSERT INTO shop_item VALUES (1, 'lamp', 9.5, x'01ff'), (2, 'it''s
two lines', NULL, NULL), (3, 'desk', 120, NULL);
                 INSERT INTO shop_tag VALUES (1, 1, 'light'), (2, 3, 'wood');
                 INSERT INTO backups_restore VALUES (1, 'source.sql');
                 INSERT INTO django_session VALUES ('abc', 'source');"
            ))
            .unwrap();
    }

    #[test]
    fn test_round_trip_preserves_rows_and_excluded_tables() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.db");
        seed_source(&source);
        let dump_file = dump(dir.path(), &source);

        let target = dir.path().join("target.db");
        open(&target)
            .conn
            .execute_batch(&format!(
                "{SCHEMA}
                 INSERT INTO shop_item VALUES (7, 'stale', 1, NULL);
                 INSERT INTO backups_restore VALUES (5, 'target.sql');
                 INSERT INTO django_session VALUES ('xyz', 'target');"
            ))
            .unwrap();

        let report = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut SqliteConnector::new(&target), &dump_file)
            .unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.cleared_tables, vec!["shop_item", "shop_tag"]);
        assert_eq!(
            report.skipped_tables,
            vec!["backups_restore", "django_session"]
        );

        let (src, dst) = (open(&source), open(&target));
        assert_eq!(rows(&src, ITEM_ROWS), rows(&dst, ITEM_ROWS));
        assert_eq!(
            rows(&src, "SELECT id || label FROM shop_tag"),
            rows(&dst, "SELECT id || label FROM shop_tag")
        );
        assert_eq!(rows(&dst, "SELECT file FROM backups_restore"), vec!["target.sql"]);
        assert_eq!(rows(&dst, "SELECT data FROM django_session"), vec!["target"]);
    }

    #[test]
    fn test_restore_into_empty_database_recreates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.db");
        seed_source(&source);
        let dump_file = dump(dir.path(), &source);

        let target = dir.path().join("empty.db");
        let report = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut SqliteConnector::new(&target), &dump_file)
            .unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(rows(&open(&target), ITEM_ROWS).len(), 3);
    }

    #[test]
    fn test_commented_schema_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.db");
        open(&source)
            .conn
            .execute_batch(
                "CREATE TABLE shop_item (
                     id INTEGER PRIMARY KEY, -- surrogate key
                     name TEXT /* display; label */
                 );
                 INSERT INTO shop_item (name) VALUES ('lamp'), ('desk'), ('chair');",
            )
            .unwrap();
        let dump_file = dump(dir.path(), &source);

        let target = dir.path().join("empty.db");
        let report = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut SqliteConnector::new(&target), &dump_file)
            .unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.applied_statements, 4);
        assert_eq!(
            rows(&open(&target), "SELECT name FROM shop_item"),
            vec!["chair", "desk", "lamp"]
        );
    }

    #[test]
    fn test_replaying_twice_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.db");
        seed_source(&source);
        let dump_file = dump(dir.path(), &source);

        let engine = RestoreEngine::new(ExclusionPolicy::default());
        let mut target = SqliteConnector::new(&source);
        let first = engine.restore_backup(&mut target, &dump_file).unwrap();
        let second = engine.restore_backup(&mut target, &dump_file).unwrap();

        assert!(first.is_clean(), "{:?}", first);
        assert!(second.is_clean(), "{:?}", second);
        assert_eq!(first.applied_statements, second.applied_statements);
    }

    #[test]
    fn test_unique_violation_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.db");
        open(&target).conn.execute_batch(SCHEMA).unwrap();

        // the second shop_item row collides with the first on the unique name
        let dump_file = dir.path().join("conflict.sql");
        std::fs::write(
            &dump_file,
            "INSERT INTO \"shop_item\" (\"id\",\"name\") VALUES (1,'lamp');\n\
             INSERT INTO \"shop_item\" (\"id\",\"name\") VALUES (2,'lamp');\n\
             INSERT INTO \"shop_item\" (\"id\",\"name\") VALUES (3,'desk');\n\
             INSERT INTO \"shop_tag\" (\"id\",\"item_id\",\"label\") VALUES (1,3,'wood');\n",
        )
        .unwrap();

        let report = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut SqliteConnector::new(&target), &dump_file)
            .unwrap();

        assert_eq!(report.applied_statements, 3);
        assert_eq!(report.deferred_statements, 0);
        assert_eq!(report.failed_statements.len(), 1);
        assert_eq!(report.failed_statements[0].line, 2);
        assert!(report.failed_statements[0].statement.contains("VALUES (2,'lamp')"));
        assert_eq!(
            rows(&open(&target), "SELECT name FROM shop_item"),
            vec!["desk", "lamp"]
        );
    }

    #[test]
    fn test_child_rows_before_parents_apply_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.db");
        // the trigger enforces the parent key the way an enforced foreign key would
        open(&target)
            .conn
            .execute_batch(
                "CREATE TABLE a_child (id INTEGER PRIMARY KEY, parent_id INTEGER);
                 CREATE TABLE b_parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE c_grandchild (id INTEGER PRIMARY KEY, child_id INTEGER);
                 CREATE TRIGGER a_child_parent BEFORE INSERT ON a_child
                 WHEN NOT EXISTS (SELECT 1 FROM b_parent WHERE id = NEW.parent_id)
                 BEGIN SELECT RAISE(ABORT, 'parent missing'); END;
                 CREATE TRIGGER c_grandchild_child BEFORE INSERT ON c_grandchild
                 WHEN NOT EXISTS (SELECT 1 FROM a_child WHERE id = NEW.child_id)
                 BEGIN SELECT RAISE(ABORT, 'child missing'); END;",
            )
            .unwrap();

        let dump_file = dir.path().join("ordered.sql");
        std::fs::write(
            &dump_file,
            "INSERT INTO \"c_grandchild\" (\"id\",\"child_id\") VALUES (1,1);\n\
             INSERT INTO \"a_child\" (\"id\",\"parent_id\") VALUES (1,1);\n\
             INSERT INTO \"a_child\" (\"id\",\"parent_id\") VALUES (2,9);\n\
             INSERT INTO \"b_parent\" (\"id\") VALUES (1);\n",
        )
        .unwrap();

        let report = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut SqliteConnector::new(&target), &dump_file)
            .unwrap();

        assert_eq!(report.applied_statements, 3);
        assert_eq!(report.deferred_statements, 2);
        assert_eq!(report.failed_statements.len(), 1);
        assert_eq!(report.failed_statements[0].line, 3);
        assert!(report.failed_statements[0].error.contains("parent missing"));
        assert_eq!(
            rows(&open(&target), "SELECT id || '' FROM c_grandchild"),
            vec!["1"]
        );
        assert_eq!(
            rows(&open(&target), "SELECT id || '' FROM a_child"),
            vec!["1"]
        );
    }

    #[test]
    fn test_corrupt_dump_leaves_database_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.db");
        open(&target)
            .conn
            .execute_batch(&format!(
                "{SCHEMA} INSERT INTO shop_item (id, name) VALUES (1, 'keep');"
            ))
            .unwrap();

        let dump_file = dir.path().join("truncated.sql");
        std::fs::write(
            &dump_file,
            "INSERT INTO \"shop_item\" (\"id\",\"name\") VALUES (2,'cut off\n",
        )
        .unwrap();

        let result = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut SqliteConnector::new(&target), &dump_file);
        assert!(matches!(result, Err(Error::CorruptDump { .. })));
        assert_eq!(
            rows(&open(&target), "SELECT name FROM shop_item"),
            vec!["keep"]
        );

        let missing = RestoreEngine::new(ExclusionPolicy::default()).restore_backup(
            &mut SqliteConnector::new(&target),
            &dir.path().join("missing.sql"),
        );
        assert!(matches!(missing, Err(Error::CorruptDump { .. })));
    }

    /// SQLite connector reporting a fixed foreign-key graph and recording clears
    struct GraphConnector {
        inner: SqliteConnector,
        referencing: Vec<(&'static str, Vec<String>)>,
        clears: Vec<(String, bool)>,
    }

    impl Connector for GraphConnector {
        fn dialect(&self) -> crate::vault::dialect::Dialect {
            self.inner.dialect()
        }
        fn ensure_connected(&mut self) -> Result<()> {
            self.inner.ensure_connected()
        }
        fn list_tables(&mut self) -> Result<Vec<String>> {
            self.inner.list_tables()
        }
        fn table_schema(&mut self, table: &str) -> Result<Option<String>> {
            self.inner.table_schema(table)
        }
        fn stream_inserts(
            &mut self,
            table: &str,
            sink: &mut crate::vault::connector::StatementSink<'_>,
        ) -> Result<u64> {
            self.inner.stream_inserts(table, sink)
        }
        fn sequence_reset(&mut self, table: &str) -> Result<Option<String>> {
            self.inner.sequence_reset(table)
        }
        fn referencing_tables(&mut self, table: &str) -> Result<Vec<String>> {
            Ok(self
                .referencing
                .iter()
                .find(|(name, _)| *name == table)
                .map(|(_, tables)| tables.clone())
                .unwrap_or_default())
        }
        fn clear_table(&mut self, table: &str, cascade: bool) -> Result<()> {
            self.clears.push((table.to_string(), cascade));
            self.inner.clear_table(table, cascade)
        }
        fn execute_isolated(&mut self, statement: &str) -> Result<()> {
            self.inner.execute_isolated(statement)
        }
    }

    #[test]
    fn test_no_cascade_through_chain_to_excluded_table() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.db");
        open(&target)
            .conn
            .execute_batch(
                "CREATE TABLE accounts_org (id INTEGER PRIMARY KEY);
                 CREATE TABLE accounts_user (id INTEGER PRIMARY KEY, org_id INTEGER REFERENCES accounts_org(id));
                 CREATE TABLE backups_restore (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES accounts_user(id));
                 CREATE TABLE shop_item (id INTEGER PRIMARY KEY);
                 CREATE TABLE shop_tag (id INTEGER PRIMARY KEY, item_id INTEGER REFERENCES shop_item(id));
                 INSERT INTO accounts_org VALUES (1);
                 INSERT INTO accounts_user VALUES (1, 1);
                 INSERT INTO backups_restore VALUES (1, 1);",
            )
            .unwrap();
        let dump_file = dir.path().join("empty.sql");
        std::fs::write(&dump_file, "").unwrap();

        // accounts_org <- accounts_user <- backups_restore, shop_item <- shop_tag
        let mut connector = GraphConnector {
            inner: SqliteConnector::new(&target),
            referencing: vec![
                (
                    "accounts_org",
                    vec!["accounts_user".to_string(), "backups_restore".to_string()],
                ),
                ("accounts_user", vec!["backups_restore".to_string()]),
                ("shop_item", vec!["shop_tag".to_string()]),
            ],
            clears: vec![],
        };

        let report = RestoreEngine::new(ExclusionPolicy::default())
            .restore_backup(&mut connector, &dump_file)
            .unwrap();

        assert_eq!(
            connector.clears,
            vec![
                ("accounts_org".to_string(), false),
                ("accounts_user".to_string(), false),
                ("shop_item".to_string(), true),
                ("shop_tag".to_string(), true),
            ]
        );
        assert_eq!(report.skipped_tables, vec!["backups_restore"]);
        assert_eq!(
            rows(&open(&target), "SELECT id || '' FROM backups_restore"),
            vec!["1"]
        );
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(STATEMENT_PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), STATEMENT_PREVIEW_CHARS + 3);
        assert_eq!(preview("SELECT 1"), "SELECT 1");
    }
}
