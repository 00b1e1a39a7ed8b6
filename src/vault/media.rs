//! Media snapshot
//!
//! Archives the media root verbatim into a deflated zip and restores such an
//! archive over it. The backup root is never archived, even when it lies
//! inside the media root.

use crate::error::{Error, Result};
use crate::vault::paths::{relative_to_root, timestamped_file_name};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Result of a media backup or restore
#[derive(Debug, Clone, Serialize)]
pub struct MediaReport {
    /// Absolute path of the archive
    pub path: PathBuf,
    /// Archive path relative to the media root, or absolute when outside it
    pub relative_path: String,
    pub files: u64,
    /// Uncompressed size of the archived files
    pub bytes: u64,
}

pub struct MediaSnapshot {
    media_root: PathBuf,
    backup_root: PathBuf,
}

impl MediaSnapshot {
    pub fn new(media_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            backup_root: backup_root.into(),
        }
    }

    /// Zip the media root into `media_backup_<DD-MM-YYYY-HH:MM>.zip` under the
    /// backup root
    pub fn backup(&self) -> Result<MediaReport> {
        std::fs::create_dir_all(&self.media_root)?;
        std::fs::create_dir_all(&self.backup_root)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".media_backup")
            .suffix(".zip.part")
            .tempfile_in(&self.backup_root)?;

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut files = 0;
        let mut bytes = 0;
        {
            let mut zip = ZipWriter::new(BufWriter::new(temp.as_file_mut()));
            let walker = WalkDir::new(&self.media_root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !e.path().starts_with(&self.backup_root));

            for entry in walker {
                let entry = entry.map_err(std::io::Error::from)?;
                let name = relative_to_root(entry.path(), &self.media_root);
                let file_type = entry.file_type();

                if file_type.is_dir() {
                    zip.add_directory(name.as_str(), options).map_err(zip_io)?;
                } else if file_type.is_file() {
                    zip.start_file(name.as_str(), options).map_err(zip_io)?;
                    let mut source = File::open(entry.path())?;
                    bytes += std::io::copy(&mut source, &mut zip)?;
                    files += 1;
                } else {
                    debug!("skipping {} (not a regular file)", entry.path().display());
                }
            }

            let mut out = zip.finish().map_err(zip_io)?;
            out.flush()?;
        }
        temp.as_file().sync_all()?;

        let path = self
            .backup_root
            .join(timestamped_file_name("media_backup", "zip"));
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;
        let relative_path = relative_to_root(&path, &self.media_root);
        info!(
            "Media backup {} written: {} files, {} bytes",
            relative_path, files, bytes
        );

        Ok(MediaReport {
            path,
            relative_path,
            files,
            bytes,
        })
    }

    /// Extract `archive` over the media root
    ///
    /// Every entry is checked before anything is written; an unreadable archive
    /// or an entry escaping the media root fails with [`Error::CorruptArchive`].
    /// Entries are extracted into a staging directory inside the media root and
    /// only moved into place once all of them were read successfully.
    pub fn restore(&self, archive: &Path) -> Result<MediaReport> {
        let corrupt = |message: String| Error::CorruptArchive {
            path: archive.to_path_buf(),
            message,
        };

        let file = File::open(archive).map_err(|e| corrupt(e.to_string()))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(e.to_string()))?;

        let mut entries = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
            let Some(name) = entry.enclosed_name() else {
                return Err(corrupt(format!("unsafe entry path '{}'", entry.name())));
            };
            entries.push((index, name, entry.is_dir()));
        }

        std::fs::create_dir_all(&self.media_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".sqlvault-restore")
            .tempdir_in(&self.media_root)?;

        let mut files = 0;
        let mut bytes = 0;
        for (index, name, is_dir) in entries {
            let target = staging.path().join(&name);
            if is_dir {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut entry = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
            let mut out = File::create(&target)?;
            // checksum mismatches surface while reading the entry
            bytes += std::io::copy(&mut entry, &mut out)
                .map_err(|e| corrupt(format!("{}: {}", name.display(), e)))?;
            files += 1;
        }

        self.move_into_place(staging.path())?;
        info!(
            "Media restored from {}: {} files, {} bytes",
            archive.display(),
            files,
            bytes
        );

        Ok(MediaReport {
            path: archive.to_path_buf(),
            relative_path: relative_to_root(archive, &self.media_root),
            files,
            bytes,
        })
    }

    fn move_into_place(&self, staging: &Path) -> Result<()> {
        let staged = WalkDir::new(staging)
            .min_depth(1)
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(std::io::Error::from)?;

        for entry in staged {
            let Ok(relative) = entry.path().strip_prefix(staging) else {
                continue;
            };
            let dest = self.media_root.join(relative);

            if entry.file_type().is_dir() {
                if dest.is_file() {
                    std::fs::remove_file(&dest)?;
                }
                std::fs::create_dir_all(&dest)?;
            } else {
                if dest.is_dir() {
                    std::fs::remove_dir_all(&dest)?;
                }
                std::fs::rename(entry.path(), &dest)?;
            }
        }
        Ok(())
    }
}

fn zip_io(e: zip::result::ZipError) -> std::io::Error {
    std::io::Error::other(e)
}
