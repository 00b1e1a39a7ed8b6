//! Core database infrastructure
//!
//! - `DatabaseConn`: SQLite connection wrapper for the catalog and for
//!   SQLite restore targets
//! - `SchemaManager`: catalog schema initialization and versioning
//! - `SchemaStatus`: schema state enumeration

mod connection;
mod schema;

pub use connection::DatabaseConn;
pub use schema::{SchemaDefinitions, SchemaManager, SchemaStatus, SCHEMA_VERSION};
