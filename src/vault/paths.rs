//! Backup file naming

use chrono::Local;
use std::path::{Component, Path};

/// Minute resolution; two backups in the same minute share a name
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H:%M";

/// `<prefix>_<DD-MM-YYYY-HH:MM>.<ext>` for the current local time
pub fn timestamped_file_name(prefix: &str, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        Local::now().format(TIMESTAMP_FORMAT),
        extension
    )
}

/// Path of `path` relative to `root` with `/` separators, or the absolute
/// path when `path` does not lie under `root`
pub fn relative_to_root(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().to_string(),
    }
}
