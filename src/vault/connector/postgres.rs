//! PostgreSQL connector
//!
//! sqlx is async; the engines are synchronous and single-threaded, so the
//! connector owns a current-thread tokio runtime and blocks on each call.
//! Rows are pulled from the server one at a time while streaming a table.

use super::{Connector, StatementSink};
use crate::config::VaultConfig;
use crate::error::{Error, Result};
use crate::vault::dialect::{quote_ident, Dialect};
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Connector for a PostgreSQL database (`public` schema)
pub struct PostgresConnector {
    options: PgConnectOptions,
    runtime: Runtime,
    conn: Option<PgConnection>,
}

impl PostgresConnector {
    /// Create a connector; nothing is opened yet
    pub fn new(options: PgConnectOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            options,
            runtime,
            conn: None,
        })
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        if config.database_name.trim().is_empty() {
            return Err(Error::config("database_name must name the PostgreSQL database"));
        }
        let mut options = PgConnectOptions::new()
            .host(&config.database_host)
            .port(config.database_port)
            .database(&config.database_name);
        if !config.database_user.is_empty() {
            options = options.username(&config.database_user);
        }
        if !config.database_password.is_empty() {
            options = options.password(&config.database_password);
        }
        Self::new(options)
    }

    /// Create a connector from a `postgres://` URL
    pub fn from_url(url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| Error::config(format!("invalid PostgreSQL URL: {}", e)))?;
        Self::new(options)
    }

    fn connect(&mut self) -> Result<()> {
        let conn = self
            .runtime
            .block_on(PgConnection::connect_with(&self.options))
            .map_err(|e| Error::Connectivity {
                message: e.to_string(),
            })?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Runtime and live connection, connecting first when needed
    fn parts(&mut self) -> Result<(&Runtime, &mut PgConnection)> {
        if self.conn.is_none() {
            self.connect()?;
        }
        match self.conn.as_mut() {
            Some(conn) => Ok((&self.runtime, conn)),
            None => Err(Error::Connectivity {
                message: "no PostgreSQL connection".to_string(),
            }),
        }
    }

    fn columns(&mut self, table: &str) -> Result<Vec<String>> {
        let (runtime, conn) = self.parts()?;
        let columns = runtime.block_on(
            sqlx::query_scalar::<_, String>(Dialect::Postgres.statements().list_columns)
                .bind(table)
                .fetch_all(&mut *conn),
        )?;
        Ok(columns)
    }
}

impl Connector for PostgresConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn ensure_connected(&mut self) -> Result<()> {
        let alive = match self.conn.as_mut() {
            Some(conn) => self.runtime.block_on(conn.ping()).is_ok(),
            None => false,
        };
        if !alive {
            if self.conn.is_some() {
                info!("PostgreSQL connection unusable, reconnecting");
            }
            self.conn = None;
            self.connect()?;
        }
        Ok(())
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        let (runtime, conn) = self.parts()?;
        let tables = runtime.block_on(
            sqlx::query_scalar::<_, String>(Dialect::Postgres.statements().list_tables)
                .fetch_all(&mut *conn),
        )?;
        Ok(tables)
    }

    fn table_schema(&mut self, _table: &str) -> Result<Option<String>> {
        // schema is managed outside the dump for client/server databases
        Ok(None)
    }

    fn stream_inserts(&mut self, table: &str, sink: &mut StatementSink<'_>) -> Result<u64> {
        let columns = self.columns(table)?;
        if columns.is_empty() {
            return Ok(0);
        }
        let sql = Dialect::Postgres.select_inserts_sql(table, &columns);
        debug!("streaming rows of {}", table);

        let (runtime, conn) = self.parts()?;
        let mut rows = sqlx::query_scalar::<_, String>(&sql).fetch(&mut *conn);
        let mut count = 0;
        while let Some(statement) = runtime.block_on(rows.try_next())? {
            sink(&statement)?;
            count += 1;
        }
        Ok(count)
    }

    fn sequence_reset(&mut self, table: &str) -> Result<Option<String>> {
        let statements = Dialect::Postgres.statements();
        let Some(serial_query) = statements.serial_sequence else {
            return Ok(None);
        };
        // pg_get_serial_sequence raises for a missing column
        if !self.columns(table)?.iter().any(|c| c == "id") {
            debug!("{} has no id column, no sequence reset", table);
            return Ok(None);
        }

        let (runtime, conn) = self.parts()?;
        let sequence = runtime.block_on(
            sqlx::query_scalar::<_, Option<String>>(serial_query)
                .bind(quote_ident(table))
                .fetch_one(&mut *conn),
        )?;

        Ok(sequence.and_then(|seq| Dialect::Postgres.reset_sequence_sql(&seq, table)))
    }

    fn referencing_tables(&mut self, table: &str) -> Result<Vec<String>> {
        let Some(query) = Dialect::Postgres.statements().referencing_tables else {
            return Ok(vec![]);
        };
        let (runtime, conn) = self.parts()?;
        let tables = runtime.block_on(
            sqlx::query_scalar::<_, String>(query)
                .bind(table)
                .fetch_all(&mut *conn),
        )?;
        Ok(tables)
    }

    fn clear_table(&mut self, table: &str, cascade: bool) -> Result<()> {
        let sql = Dialect::Postgres.clear_table_sql(table, cascade);
        let (runtime, conn) = self.parts()?;
        runtime.block_on(sqlx::raw_sql(&sql).execute(&mut *conn))?;
        Ok(())
    }

    fn execute_isolated(&mut self, statement: &str) -> Result<()> {
        let (runtime, conn) = self.parts()?;
        runtime.block_on(async {
            let mut tx = conn.begin().await?;
            match sqlx::raw_sql(statement).execute(&mut *tx).await {
                Ok(_) => {
                    tx.commit().await?;
                    Ok::<(), Error>(())
                }
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!("rollback failed after statement error: {}", rollback);
                    }
                    Err(Error::from(e))
                }
            }
        })
    }
}
