//! Vault facade
//!
//! The entry points a trigger layer (the CLI, a scheduler) calls. Every
//! operation that touches backup files or the target database runs under the
//! [`OperationLock`] of the backup root, and every backup or restore is
//! recorded in the catalog with the acting identity.

use crate::config::VaultConfig;
use crate::database::catalog::{BackupCategory, BackupRecord, CatalogDatabase, RestoreRecord};
use crate::error::Result;
use crate::vault::connector::select_connector;
use crate::vault::dump::{DumpEngine, DumpReport};
use crate::vault::exclusion::ExclusionPolicy;
use crate::vault::lock::OperationLock;
use crate::vault::paths::relative_to_root;
use crate::vault::restore::{RestoreEngine, RestoreReport};
use crate::vault::retention::RetentionManager;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(feature = "media")]
use crate::vault::media::{MediaReport, MediaSnapshot};

/// A recorded backup together with what the engine reported
#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome<R> {
    pub record: BackupRecord,
    pub report: R,
    /// Records (and files) removed by retention
    pub evicted: Vec<BackupRecord>,
}

/// A recorded restore together with what the engine reported
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome<R> {
    pub record: RestoreRecord,
    pub report: R,
}

pub struct Vault {
    config: VaultConfig,
    catalog: CatalogDatabase,
    policy: ExclusionPolicy,
    retention: RetentionManager,
}

impl Vault {
    /// Open the catalog under the configured backup root
    pub fn new(config: VaultConfig) -> Result<Self> {
        let catalog = CatalogDatabase::open(&config.catalog_path())?;
        Ok(Self::with_catalog(config, catalog))
    }

    pub fn with_catalog(config: VaultConfig, catalog: CatalogDatabase) -> Self {
        let policy = ExclusionPolicy::from_config(&config);
        let retention = RetentionManager::new(config.max_backups);
        Self {
            config,
            catalog,
            policy,
            retention,
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Dump the configured database, record it and enforce retention
    pub fn backup_database(&self, actor: &str) -> Result<BackupOutcome<DumpReport>> {
        let _lock = OperationLock::acquire(&self.config.backup_root)?;
        let mut connector = select_connector(&self.config)?;

        let engine = DumpEngine::new(
            self.policy.clone(),
            &self.config.backup_root,
            &self.config.media_root,
        );
        let report = engine.create_backup(&mut connector)?;
        let (record, evicted) =
            self.record_backup(BackupCategory::Database, &report.relative_path, actor)?;

        Ok(BackupOutcome {
            record,
            report,
            evicted,
        })
    }

    /// Archive the media root, record it and enforce retention
    #[cfg(feature = "media")]
    pub fn backup_media(&self, actor: &str) -> Result<BackupOutcome<MediaReport>> {
        let _lock = OperationLock::acquire(&self.config.backup_root)?;
        let snapshot = MediaSnapshot::new(&self.config.media_root, &self.config.backup_root);
        let report = snapshot.backup()?;
        let (record, evicted) =
            self.record_backup(BackupCategory::Media, &report.relative_path, actor)?;

        Ok(BackupOutcome {
            record,
            report,
            evicted,
        })
    }

    /// Clear the configured database and replay `file` into it
    ///
    /// `file` may be given as stored in the catalog (relative to the media
    /// root). The restore is recorded before it runs.
    pub fn restore_database(
        &self,
        file: &Path,
        actor: &str,
    ) -> Result<RestoreOutcome<RestoreReport>> {
        let _lock = OperationLock::acquire(&self.config.backup_root)?;
        let mut connector = select_connector(&self.config)?;
        let path = self.resolve(file);

        let record = self.catalog.restores().insert(
            BackupCategory::Database,
            &relative_to_root(&path, &self.config.media_root),
            actor,
        )?;
        info!("Restore {} requested by {}", record.file, actor);

        let report =
            RestoreEngine::new(self.policy.clone()).restore_backup(&mut connector, &path)?;
        Ok(RestoreOutcome { record, report })
    }

    /// Extract a media archive over the media root
    #[cfg(feature = "media")]
    pub fn restore_media(&self, file: &Path, actor: &str) -> Result<RestoreOutcome<MediaReport>> {
        let _lock = OperationLock::acquire(&self.config.backup_root)?;
        let path = self.resolve(file);

        let record = self.catalog.restores().insert(
            BackupCategory::Media,
            &relative_to_root(&path, &self.config.media_root),
            actor,
        )?;
        info!("Media restore {} requested by {}", record.file, actor);

        let snapshot = MediaSnapshot::new(&self.config.media_root, &self.config.backup_root);
        let report = snapshot.restore(&path)?;
        Ok(RestoreOutcome { record, report })
    }

    /// Backups of one category, or of all, newest first
    pub fn list_backups(&self, category: Option<BackupCategory>) -> Result<Vec<BackupRecord>> {
        match category {
            Some(category) => {
                let mut records = self.catalog.backups().list(category)?;
                records.reverse();
                Ok(records)
            }
            None => self.catalog.backups().list_all(),
        }
    }

    /// Restores, newest first
    pub fn list_restores(&self) -> Result<Vec<RestoreRecord>> {
        self.catalog.restores().list()
    }

    /// Delete a backup record and its file
    pub fn delete_backup(&self, id: i64) -> Result<BackupRecord> {
        let _lock = OperationLock::acquire(&self.config.backup_root)?;
        self.catalog
            .backups()
            .delete_by_id(id, &self.config.media_root)
    }

    fn record_backup(
        &self,
        category: BackupCategory,
        file: &str,
        actor: &str,
    ) -> Result<(BackupRecord, Vec<BackupRecord>)> {
        let backups = self.catalog.backups();
        let record = backups.insert_or_replace(category, file, actor)?;
        let evicted = self
            .retention
            .enforce(&backups, category, &self.config.media_root)?;
        Ok((record, evicted))
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() || file.exists() {
            file.to_path_buf()
        } else {
            self.config.media_root.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::DatabaseConn;
    use crate::error::Error;
    use crate::vault::lock::LOCK_FILE_NAME;

    fn sqlite_vault(dir: &Path) -> Vault {
        let database = dir.join("app.db");
        DatabaseConn::open_target(&database)
            .unwrap()
            .conn
            .execute_batch(
                "CREATE TABLE shop_item (id INTEGER PRIMARY KEY, name TEXT);
                 INSERT INTO shop_item VALUES (1, 'lamp'), (2, 'desk');",
            )
            .unwrap();

        let media_root = dir.join("media");
        let config = VaultConfig {
            database_engine: "django.db.backends.sqlite3".to_string(),
            database_name: database.to_string_lossy().to_string(),
            backup_root: media_root.join("backups"),
            media_root,
            ..Default::default()
        };
        Vault::new(config).unwrap()
    }

    #[test]
    fn test_backup_then_restore_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let vault = sqlite_vault(dir.path());

        let backup = vault.backup_database("alice").unwrap();
        assert_eq!(backup.record.category, BackupCategory::Database);
        assert_eq!(backup.record.file, backup.report.relative_path);
        assert!(backup.record.file_path(&vault.config().media_root).exists());
        assert!(backup.evicted.is_empty());

        let restore = vault
            .restore_database(Path::new(&backup.record.file), "bob")
            .unwrap();
        assert!(restore.report.is_clean(), "{:?}", restore.report);
        assert_eq!(restore.report.applied_statements, 3);

        let restores = vault.list_restores().unwrap();
        assert_eq!(restores.len(), 1);
        assert_eq!(restores[0].restored_by, "bob");
        assert_eq!(restores[0].file, backup.record.file);
        assert!(!vault.config().backup_root.join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn test_same_minute_backups_share_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let vault = sqlite_vault(dir.path());

        let first = vault.backup_database("alice").unwrap();
        let second = vault.backup_database("alice").unwrap();
        if first.record.file == second.record.file {
            assert_eq!(first.record.id, second.record.id);
        }
        let listed = vault.list_backups(Some(BackupCategory::Database)).unwrap();
        assert!(!listed.is_empty() && listed.len() <= 2);
        for record in listed {
            assert!(record.file_path(&vault.config().media_root).exists());
        }
    }

    #[test]
    fn test_busy_lock_blocks_operations() {
        let dir = tempfile::tempdir().unwrap();
        let vault = sqlite_vault(dir.path());
        let _held = OperationLock::acquire(&vault.config().backup_root).unwrap();

        assert!(matches!(
            vault.backup_database("alice"),
            Err(Error::Busy { .. })
        ));
        assert!(vault.list_backups(None).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_engine_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let media_root = dir.path().join("media");
        let config = VaultConfig {
            database_engine: "django.db.backends.oracle".to_string(),
            backup_root: media_root.join("backups"),
            media_root,
            ..Default::default()
        };
        let vault = Vault::new(config).unwrap();

        assert!(matches!(
            vault.backup_database("alice"),
            Err(Error::UnsupportedEngine { .. })
        ));
        assert!(matches!(
            vault.restore_database(Path::new("backups/x.sql"), "alice"),
            Err(Error::UnsupportedEngine { .. })
        ));
        assert!(vault.list_backups(None).unwrap().is_empty());
        assert!(vault.list_restores().unwrap().is_empty());
    }

    #[test]
    fn test_delete_backup_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = sqlite_vault(dir.path());
        let backup = vault.backup_database("alice").unwrap();

        let deleted = vault.delete_backup(backup.record.id).unwrap();
        assert_eq!(deleted.id, backup.record.id);
        assert!(!backup.report.path.exists());
        assert!(matches!(
            vault.delete_backup(backup.record.id),
            Err(Error::RecordNotFound { .. })
        ));
    }

    #[cfg(feature = "media")]
    #[test]
    fn test_media_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let vault = sqlite_vault(dir.path());
        let media_root = vault.config().media_root.clone();
        std::fs::write(media_root.join("avatar.png"), b"png").unwrap();

        let backup = vault.backup_media("alice").unwrap();
        assert_eq!(backup.record.category, BackupCategory::Media);
        assert_eq!(backup.report.files, 1);

        std::fs::remove_file(media_root.join("avatar.png")).unwrap();
        let restore = vault
            .restore_media(Path::new(&backup.record.file), "bob")
            .unwrap();
        assert_eq!(restore.record.category, BackupCategory::Media);
        assert!(media_root.join("avatar.png").exists());
    }
}
