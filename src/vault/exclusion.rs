//! Table exclusion policy
//!
//! The same policy instance is consulted by the dump engine and by both
//! restore phases, so a table that never reaches a dump is never cleared.

use crate::config::VaultConfig;
use std::collections::BTreeSet;

/// Prefixes of framework-owned and engine-internal tables
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["django_", "auth_", "sqlite_"];

/// Table recording restore events; restoring it mid-restore would corrupt it
pub const RESTORE_LOG_TABLE: &str = "backups_restore";

/// Decides whether a table is skipped during dump and restore
///
/// Matching is ASCII case-insensitive for both prefixes and names.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    prefixes: Vec<String>,
    tables: BTreeSet<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            tables: BTreeSet::from([RESTORE_LOG_TABLE.to_string()]),
        }
    }
}

impl ExclusionPolicy {
    /// Default policy extended with the configured tables and prefixes
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::default()
            .with_tables(config.exclude_tables.iter().cloned())
            .with_prefixes(config.exclude_prefixes.iter().cloned())
    }

    pub fn with_tables<I: IntoIterator<Item = String>>(mut self, tables: I) -> Self {
        self.tables
            .extend(tables.into_iter().map(|t| t.to_ascii_lowercase()));
        self
    }

    pub fn with_prefixes<I: IntoIterator<Item = String>>(mut self, prefixes: I) -> Self {
        for prefix in prefixes {
            let prefix = prefix.to_ascii_lowercase();
            if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
                self.prefixes.push(prefix);
            }
        }
        self
    }

    pub fn is_excluded(&self, table_name: &str) -> bool {
        let name = table_name.to_ascii_lowercase();
        self.tables.contains(&name) || self.prefixes.iter().any(|p| name.starts_with(p))
    }
}
