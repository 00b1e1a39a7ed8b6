//! Backup and restore engine
//!
//! ```text
//! vault/
//! ├── dialect    # per-engine statement catalog
//! ├── exclusion  # tables never dumped or cleared
//! ├── statement  # dump stream reader and writer
//! ├── connector/ # SQLite and PostgreSQL connections
//! ├── dump       # connector -> dump file
//! ├── restore    # dump file -> connector
//! ├── retention  # per-category backup cap
//! ├── lock       # single-flight lock file
//! ├── media      # media root zip snapshots (feature = "media")
//! └── service    # Vault facade used by trigger layers
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlvault::{Vault, VaultConfig};
//!
//! let config = VaultConfig::new(&None)?;
//! let vault = Vault::new(config)?;
//!
//! let backup = vault.backup_database("alice")?;
//! println!("wrote {}", backup.record.file);
//!
//! let restore = vault.restore_database(backup.report.path.as_path(), "alice")?;
//! if !restore.report.is_clean() {
//!     eprintln!("{} statements failed", restore.report.failed_statements.len());
//! }
//! ```

pub mod connector;
pub mod dialect;
pub mod dump;
pub mod exclusion;
pub mod lock;
#[cfg(feature = "media")]
pub mod media;
pub mod paths;
pub mod restore;
pub mod retention;
pub mod service;
pub mod statement;

pub use connector::{select_connector, Connector, DbConnector, SqliteConnector};
#[cfg(feature = "postgres")]
pub use connector::PostgresConnector;
pub use dialect::{Dialect, DialectStatements};
pub use dump::{DumpEngine, DumpReport, DumpStats, TableDump, TableFailure};
pub use exclusion::{ExclusionPolicy, DEFAULT_EXCLUDED_PREFIXES, RESTORE_LOG_TABLE};
pub use lock::OperationLock;
#[cfg(feature = "media")]
pub use media::{MediaReport, MediaSnapshot};
pub use restore::{RestoreEngine, RestoreReport, StatementFailure};
pub use retention::RetentionManager;
pub use service::{BackupOutcome, RestoreOutcome, Vault};
pub use statement::{Statement, StatementReader};
