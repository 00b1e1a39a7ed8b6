//! Single-flight guard for backup and restore operations

use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = ".sqlvault.lock";

/// Exclusive lock file held for the duration of one operation
///
/// The file is created with create-new semantics and holds the owner's pid.
/// It is removed when the lock is dropped. A process killed while holding the
/// lock leaves the file behind; it must then be removed by hand.
#[derive(Debug)]
pub struct OperationLock {
    path: PathBuf,
}

impl OperationLock {
    /// Acquire the lock in `dir`, failing with [`Error::Busy`] when it is held
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Busy { lock_path: path });
            }
            Err(e) => return Err(e.into()),
        };
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())?;
        debug!("acquired {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
