//! Dialect catalog
//!
//! One immutable [`DialectStatements`] set per supported engine. Row values are
//! never rendered in Rust: the `select_inserts` query asks the engine to quote
//! every column with its own literal quoting (`quote()` on SQLite,
//! `quote_nullable()` on PostgreSQL), so text, binary, numeric and NULL values
//! come back as replayable SQL literals.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Supported database engine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Embedded single-file engine; dumps carry their own table definitions
    Sqlite,
    /// Client/server engine; dumps carry a sequence reset per table
    Postgres,
}

/// Statement templates for one dialect
///
/// `{table}` is replaced by a quoted identifier, `{columns}` by the quoted
/// column list, `{prefix}` by a string literal and `{values}` by the quoted
/// value expression list.
#[derive(Debug)]
pub struct DialectStatements {
    pub list_tables: &'static str,
    /// Takes the bare table name as its only parameter
    pub list_columns: &'static str,
    pub select_inserts: &'static str,
    /// Takes the bare table name as its only parameter
    pub dump_schema: Option<&'static str>,
    /// Takes the quoted table name as its only parameter
    pub serial_sequence: Option<&'static str>,
    pub reset_sequence: Option<&'static str>,
    /// Takes the bare table name as its only parameter; yields direct and
    /// indirect referencing tables
    pub referencing_tables: Option<&'static str>,
    pub clear_table: &'static str,
    pub clear_table_cascade: Option<&'static str>,
}

static SQLITE_STATEMENTS: DialectStatements = DialectStatements {
    list_tables: r#"SELECT "name" FROM "sqlite_master" WHERE "type" = 'table' AND "sql" IS NOT NULL ORDER BY "name""#,
    list_columns: "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
    select_inserts: "SELECT {prefix} || {values} || ')' FROM {table}",
    dump_schema: Some(r#"SELECT "sql" FROM "sqlite_master" WHERE "type" = 'table' AND "name" = ?1"#),
    serial_sequence: None,
    reset_sequence: None,
    referencing_tables: None,
    clear_table: "DELETE FROM {table}",
    clear_table_cascade: None,
};

static POSTGRES_STATEMENTS: DialectStatements = DialectStatements {
    list_tables: "SELECT tablename::text FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename",
    list_columns: "SELECT column_name::text FROM information_schema.columns \
                   WHERE table_schema = 'public' AND table_name = $1 AND is_generated = 'NEVER' \
                   ORDER BY ordinal_position",
    select_inserts: "SELECT {prefix} || {values} || ')' FROM {table}",
    dump_schema: None,
    serial_sequence: Some("SELECT pg_get_serial_sequence($1, 'id')"),
    reset_sequence: Some(
        "SELECT setval({sequence}, COALESCE((SELECT MAX(\"id\") FROM {table}), 1), \
         (SELECT MAX(\"id\") FROM {table}) IS NOT NULL)",
    ),
    // every table a TRUNCATE ... CASCADE of $1 reaches, however many hops away
    referencing_tables: Some(
        "WITH RECURSIVE refs(oid) AS ( \
             SELECT c.conrelid FROM pg_constraint c \
             JOIN pg_class dst ON dst.oid = c.confrelid \
             JOIN pg_namespace n ON n.oid = dst.relnamespace \
             WHERE c.contype = 'f' AND n.nspname = 'public' AND dst.relname = $1 \
             UNION \
             SELECT c.conrelid FROM pg_constraint c JOIN refs r ON c.confrelid = r.oid \
             WHERE c.contype = 'f' \
         ) \
         SELECT DISTINCT cls.relname::text FROM refs \
         JOIN pg_class cls ON cls.oid = refs.oid \
         WHERE cls.relname <> $1 \
         ORDER BY 1",
    ),
    clear_table: "TRUNCATE TABLE {table} RESTART IDENTITY",
    clear_table_cascade: Some("TRUNCATE TABLE {table} RESTART IDENTITY CASCADE"),
};

impl Dialect {
    /// Resolve a configured engine identifier
    ///
    /// Accepts plain names (`sqlite3`, `postgresql`) as well as fully qualified
    /// framework backend paths such as `django.db.backends.postgresql`.
    pub fn from_engine(engine: &str) -> Result<Dialect> {
        let lowered = engine.trim().to_lowercase();
        if lowered.contains("sqlite") {
            Ok(Dialect::Sqlite)
        } else if lowered.contains("postgres") {
            Ok(Dialect::Postgres)
        } else {
            Err(Error::UnsupportedEngine {
                engine: engine.to_string(),
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn statements(&self) -> &'static DialectStatements {
        match self {
            Dialect::Sqlite => &SQLITE_STATEMENTS,
            Dialect::Postgres => &POSTGRES_STATEMENTS,
        }
    }

    /// Whether dumps embed each table's creation statement
    pub fn dumps_schema(&self) -> bool {
        self.statements().dump_schema.is_some()
    }

    /// Whether dumps end each table with a sequence reset
    pub fn resets_sequences(&self) -> bool {
        self.statements().reset_sequence.is_some()
    }

    /// Query producing one complete INSERT statement per row of `table`
    pub fn select_inserts_sql(&self, table: &str, columns: &[String]) -> String {
        let table_ident = quote_ident(table);
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");
        let prefix = quote_literal(&format!(
            "INSERT INTO {} ({}) VALUES (",
            table_ident, column_list
        ));
        let values = match self {
            Dialect::Sqlite => columns
                .iter()
                .map(|c| format!("quote({})", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" || ',' || "),
            // `||` rather than a variadic call: functions take at most 100 arguments
            Dialect::Postgres => columns
                .iter()
                .map(|c| format!("quote_nullable({})", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" || ',' || "),
        };

        self.statements()
            .select_inserts
            .replace("{prefix}", &prefix)
            .replace("{values}", &values)
            .replace("{table}", &table_ident)
    }

    /// Statement resetting `sequence` to the table's current maximum id
    pub fn reset_sequence_sql(&self, sequence: &str, table: &str) -> Option<String> {
        self.statements().reset_sequence.map(|template| {
            template
                .replace("{sequence}", &quote_literal(sequence))
                .replace("{table}", &quote_ident(table))
        })
    }

    /// Statement emptying `table`
    ///
    /// `cascade` is honoured only by dialects with a cascading variant.
    pub fn clear_table_sql(&self, table: &str, cascade: bool) -> String {
        let statements = self.statements();
        let template = match (cascade, statements.clear_table_cascade) {
            (true, Some(cascading)) => cascading,
            _ => statements.clear_table,
        };
        template.replace("{table}", &quote_ident(table))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Quote an identifier with double quotes, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal with single quotes, doubling embedded quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Rewrite a `CREATE TABLE` statement so replaying it over an existing table
/// is a no-op
pub fn idempotent_create(sql: &str) -> String {
    let trimmed = sql.trim();
    let upper = trimmed.to_ascii_uppercase();
    for head in ["CREATE TABLE", "CREATE VIRTUAL TABLE"] {
        if let Some(rest) = upper.strip_prefix(head) {
            if rest.trim_start().starts_with("IF NOT EXISTS") {
                return trimmed.to_string();
            }
            return format!("{} IF NOT EXISTS{}", &trimmed[..head.len()], &trimmed[head.len()..]);
        }
    }
    trimmed.to_string()
}
