//! Dump engine
//!
//! Produces a replayable statement stream for every retained table of one
//! connector. For each table, in the order the dialect lists them:
//!
//! 1. its idempotent creation statement (dialects that dump schema),
//! 2. one INSERT per row,
//! 3. its sequence reset (dialects with sequence objects, tables that own one).
//!
//! The stream goes to a temporary file next to its destination and is renamed
//! into place only once it is complete, so a failed dump never leaves a file
//! under the final name.

use crate::error::{Error, Result};
use crate::vault::connector::Connector;
use crate::vault::dialect::Dialect;
use crate::vault::exclusion::ExclusionPolicy;
use crate::vault::paths::{relative_to_root, timestamped_file_name};
use crate::vault::statement::write_statement;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What was written for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct TableDump {
    pub table: String,
    pub rows: u64,
    /// A creation statement precedes the rows
    pub schema: bool,
    /// A sequence reset follows the rows
    pub sequence_reset: bool,
}

/// A table-level failure recorded instead of aborting the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Contents of one dump stream
#[derive(Debug, Clone, Serialize)]
pub struct DumpStats {
    pub dialect: Dialect,
    pub tables: Vec<TableDump>,
    pub skipped_tables: Vec<String>,
    pub failed_tables: Vec<TableFailure>,
    pub statements: u64,
}

impl DumpStats {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: vec![],
            skipped_tables: vec![],
            failed_tables: vec![],
            statements: 0,
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Result of [`DumpEngine::create_backup`]
#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    /// Absolute path of the dump file
    pub path: PathBuf,
    /// Path relative to the media root, or absolute when outside it
    pub relative_path: String,
    pub dialect: Dialect,
    pub tables: Vec<TableDump>,
    pub skipped_tables: Vec<String>,
    pub failed_tables: Vec<TableFailure>,
    pub statements: u64,
}

impl DumpReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Whether every retained table was dumped completely
    pub fn is_complete(&self) -> bool {
        self.failed_tables.is_empty()
    }
}

/// Writes dump files for a connector
pub struct DumpEngine {
    policy: ExclusionPolicy,
    backup_root: PathBuf,
    media_root: PathBuf,
}

impl DumpEngine {
    pub fn new(
        policy: ExclusionPolicy,
        backup_root: impl Into<PathBuf>,
        media_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            policy,
            backup_root: backup_root.into(),
            media_root: media_root.into(),
        }
    }

    /// Dump every retained table into `backup_<DD-MM-YYYY-HH:MM>.sql` under
    /// the backup root
    ///
    /// An existing file with the same name is replaced.
    pub fn create_backup<C: Connector + ?Sized>(&self, connector: &mut C) -> Result<DumpReport> {
        std::fs::create_dir_all(&self.backup_root)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".backup")
            .suffix(".sql.part")
            .tempfile_in(&self.backup_root)?;

        let stats = {
            let mut out = BufWriter::new(temp.as_file_mut());
            let stats = self.write_dump(connector, &mut out)?;
            out.flush()?;
            stats
        };
        temp.as_file().sync_all()?;

        let path = self
            .backup_root
            .join(timestamped_file_name("backup", "sql"));
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;
        let relative_path = relative_to_root(&path, &self.media_root);

        info!(
            "Backup {} written: {} tables, {} rows, {} failed",
            relative_path,
            stats.tables.len(),
            stats.total_rows(),
            stats.failed_tables.len()
        );

        Ok(DumpReport {
            path,
            relative_path,
            dialect: stats.dialect,
            tables: stats.tables,
            skipped_tables: stats.skipped_tables,
            failed_tables: stats.failed_tables,
            statements: stats.statements,
        })
    }

    /// Write the statement stream for every retained table to `out`
    ///
    /// A table whose queries fail is recorded in [`DumpStats::failed_tables`]
    /// and the dump moves on; failures writing to `out` abort the dump.
    pub fn write_dump<C, W>(&self, connector: &mut C, out: &mut W) -> Result<DumpStats>
    where
        C: Connector + ?Sized,
        W: Write,
    {
        connector.ensure_connected()?;
        let dialect = connector.dialect();
        let mut stats = DumpStats::new(dialect);

        let tables = connector.list_tables()?;
        info!("Dumping {} database with {} tables", dialect, tables.len());

        for table in tables {
            if self.policy.is_excluded(&table) {
                debug!("skipping excluded table {}", table);
                stats.skipped_tables.push(table);
                continue;
            }

            match dump_table(connector, &table, out, &mut stats.statements) {
                Ok(dumped) => {
                    debug!("dumped {} rows from {}", dumped.rows, table);
                    stats.tables.push(dumped);
                }
                Err(e) if e.is_io() => return Err(e),
                Err(e) => {
                    warn!("Failed to dump table {}: {}", table, e);
                    stats.failed_tables.push(TableFailure {
                        table,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(stats)
    }
}

fn dump_table<C, W>(
    connector: &mut C,
    table: &str,
    out: &mut W,
    statements: &mut u64,
) -> Result<TableDump>
where
    C: Connector + ?Sized,
    W: Write,
{
    let mut dumped = TableDump {
        table: table.to_string(),
        rows: 0,
        schema: false,
        sequence_reset: false,
    };

    if connector.dialect().dumps_schema() {
        if let Some(create) = connector.table_schema(table)? {
            write_statement(out, &create)?;
            *statements += 1;
            dumped.schema = true;
        }
    }

    dumped.rows = connector.stream_inserts(table, &mut |insert: &str| -> Result<()> {
        write_statement(out, insert)?;
        *statements += 1;
        Ok(())
    })?;

    if connector.dialect().resets_sequences() {
        if let Some(reset) = connector.sequence_reset(table)? {
            write_statement(out, &reset)?;
            *statements += 1;
            dumped.sequence_reset = true;
        }
    }

    Ok(dumped)
}
