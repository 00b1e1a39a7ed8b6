//! Database connectors
//!
//! A connector binds one [`Dialect`] to a live connection. Connectors are built
//! per operation by [`select_connector`]; the connection opens lazily and is
//! re-established once when it is found unusable.
//!
//! ```text
//! connector/
//! ├── sqlite    # rusqlite, embedded file databases
//! └── postgres  # sqlx on a private current-thread tokio runtime
//! ```

mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

pub use sqlite::SqliteConnector;

#[cfg(feature = "postgres")]
pub use postgres::PostgresConnector;

use crate::config::VaultConfig;
use crate::error::Result;
use crate::vault::dialect::Dialect;

/// Receives each statement produced while streaming a table
pub type StatementSink<'a> = dyn FnMut(&str) -> Result<()> + 'a;

/// Operations the dump and restore engines need from a database
///
/// Table names passed in are bare names as returned by [`Connector::list_tables`];
/// connectors quote them.
pub trait Connector {
    fn dialect(&self) -> Dialect;

    /// Check the connection and reconnect once if it is unusable
    fn ensure_connected(&mut self) -> Result<()>;

    /// All user-visible tables, in catalog order
    fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Idempotent single-line creation statement, for dialects that dump schema
    fn table_schema(&mut self, table: &str) -> Result<Option<String>>;

    /// Stream one INSERT statement per row into `sink`; returns the row count
    fn stream_inserts(&mut self, table: &str, sink: &mut StatementSink<'_>) -> Result<u64>;

    /// Statement resetting the table's id sequence, when it has one
    fn sequence_reset(&mut self, table: &str) -> Result<Option<String>>;

    /// Tables holding foreign keys that point at `table`, directly or through
    /// other referencing tables
    fn referencing_tables(&mut self, table: &str) -> Result<Vec<String>>;

    /// Empty `table`; `cascade` also empties referencing tables where supported
    fn clear_table(&mut self, table: &str, cascade: bool) -> Result<()>;

    /// Run one statement in its own transaction, rolled back on failure
    fn execute_isolated(&mut self, statement: &str) -> Result<()>;
}

/// Connector for the configured engine
pub enum DbConnector {
    Sqlite(SqliteConnector),
    #[cfg(feature = "postgres")]
    Postgres(PostgresConnector),
}

/// Resolve the configured engine into a connector
///
/// Unknown engines fail with [`Error::UnsupportedEngine`](crate::Error::UnsupportedEngine)
/// before any connection is attempted.
pub fn select_connector(config: &VaultConfig) -> Result<DbConnector> {
    match Dialect::from_engine(&config.database_engine)? {
        Dialect::Sqlite => Ok(DbConnector::Sqlite(SqliteConnector::from_config(config)?)),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(DbConnector::Postgres(PostgresConnector::from_config(
            config,
        )?)),
        #[cfg(not(feature = "postgres"))]
        Dialect::Postgres => Err(crate::error::Error::config(
            "sqlvault was built without the `postgres` feature",
        )),
    }
}

macro_rules! dispatch {
    ($self:ident, $conn:ident => $call:expr) => {
        match $self {
            DbConnector::Sqlite($conn) => $call,
            #[cfg(feature = "postgres")]
            DbConnector::Postgres($conn) => $call,
        }
    };
}

impl Connector for DbConnector {
    fn dialect(&self) -> Dialect {
        dispatch!(self, c => c.dialect())
    }

    fn ensure_connected(&mut self) -> Result<()> {
        dispatch!(self, c => c.ensure_connected())
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        dispatch!(self, c => c.list_tables())
    }

    fn table_schema(&mut self, table: &str) -> Result<Option<String>> {
        dispatch!(self, c => c.table_schema(table))
    }

    fn stream_inserts(&mut self, table: &str, sink: &mut StatementSink<'_>) -> Result<u64> {
        dispatch!(self, c => c.stream_inserts(table, sink))
    }

    fn sequence_reset(&mut self, table: &str) -> Result<Option<String>> {
        dispatch!(self, c => c.sequence_reset(table))
    }

    fn referencing_tables(&mut self, table: &str) -> Result<Vec<String>> {
        dispatch!(self, c => c.referencing_tables(table))
    }

    fn clear_table(&mut self, table: &str, cascade: bool) -> Result<()> {
        dispatch!(self, c => c.clear_table(table, cascade))
    }

    fn execute_isolated(&mut self, statement: &str) -> Result<()> {
        dispatch!(self, c => c.execute_isolated(statement))
    }
}
