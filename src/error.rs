//! Error types for sqlvault operations
//!
//! Only operation-level preconditions surface here. Failures scoped to a single
//! table or a single dump statement are accumulated into
//! [`DumpReport`](crate::vault::DumpReport) and
//! [`RestoreReport`](crate::vault::RestoreReport) instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sqlvault operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The configured engine identifier names no supported dialect.
    #[error("database engine '{engine}' is not supported for backup")]
    UnsupportedEngine { engine: String },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The connection could not be (re)established.
    #[error("connection unusable: {message}")]
    Connectivity { message: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dump file is unreadable or not a well-formed statement stream.
    #[error("corrupt dump file {path:?}: {message}")]
    CorruptDump { path: PathBuf, message: String },

    /// The media archive is malformed.
    #[error("invalid or corrupted backup archive {path:?}: {message}")]
    CorruptArchive { path: PathBuf, message: String },

    /// Another backup or restore holds the operation lock.
    #[error("another backup or restore is in progress (lock file {lock_path:?})")]
    Busy { lock_path: PathBuf },

    #[error("backup record {id} not found")]
    RecordNotFound { id: i64 },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Whether the error comes from writing or reading local files rather than
    /// from the database.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
