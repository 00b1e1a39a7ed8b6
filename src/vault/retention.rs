//! Retention manager

use crate::config::DEFAULT_MAX_BACKUPS;
use crate::database::catalog::{BackupCategory, BackupRecord, BackupRepository};
use crate::error::Result;
use std::path::Path;
use tracing::info;

/// Keeps at most `cap` backup records per category
#[derive(Debug, Clone, Copy)]
pub struct RetentionManager {
    cap: usize,
}

impl Default for RetentionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BACKUPS)
    }
}

impl RetentionManager {
    /// A cap of zero is raised to one so the newest backup always survives
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Evict the oldest records of `category` beyond the cap, deleting their
    /// files; returns the evicted records, oldest first
    pub fn enforce(
        &self,
        repo: &BackupRepository<'_>,
        category: BackupCategory,
        media_root: &Path,
    ) -> Result<Vec<BackupRecord>> {
        let records = repo.list(category)?;
        let excess = records.len().saturating_sub(self.cap);
        let mut evicted = Vec::with_capacity(excess);

        for record in records.into_iter().take(excess) {
            repo.delete(&record, media_root)?;
            info!(
                "Evicted {} backup {} (created {})",
                category, record.file, record.created_at
            );
            evicted.push(record);
        }

        Ok(evicted)
    }
}
