use anyhow::{anyhow, Result};
use config::Config;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default number of backups kept per category
pub const DEFAULT_MAX_BACKUPS: usize = 2;

/// Default PostgreSQL port when none is configured
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Engine identifier, e.g. `sqlite3` or `django.db.backends.postgresql`
    pub database_engine: String,

    pub database_host: String,

    pub database_port: u16,

    /// Database name (the database file path for SQLite)
    pub database_name: String,

    pub database_user: String,

    pub database_password: String,

    /// Shared asset root; returned backup paths are relative to it
    pub media_root: PathBuf,

    /// Directory receiving dump files and media archives
    pub backup_root: PathBuf,

    /// Extra tables never dumped nor cleared
    pub exclude_tables: Vec<String>,

    /// Extra table-name prefixes never dumped nor cleared
    pub exclude_prefixes: Vec<String>,

    /// Retention cap per backup category
    pub max_backups: usize,
}

const EMPTY_CONFIG: &str = r#"### sqlvault configuration file

### database to back up: sqlite3 or postgresql
# database_engine = "sqlite3"
# database_name = "/var/lib/app/db.sqlite3"
# database_host = "localhost"
# database_port = 5432
# database_user = "app"
# database_password = ""

### shared asset root and backup directory (defaults to <media_root>/backups)
# media_root = "~/.sqlvault/media"
# backup_root = "~/.sqlvault/media/backups"

### additional tables / prefixes to leave untouched (comma separated)
# exclude_tables = "app_auditlog"
# exclude_prefixes = "celery_"

### number of backups kept per category
# max_backups = 2
"#;

impl Default for VaultConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let media_root = home_dir.join(".sqlvault").join("media");

        Self {
            database_engine: "sqlite3".to_string(),
            database_host: "localhost".to_string(),
            database_port: DEFAULT_POSTGRES_PORT,
            database_name: home_dir
                .join(".sqlvault")
                .join("db.sqlite3")
                .to_string_lossy()
                .to_string(),
            database_user: String::new(),
            database_password: String::new(),
            backup_root: media_root.join("backups"),
            media_root,
            exclude_tables: vec![],
            exclude_prefixes: vec![],
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

impl VaultConfig {
    /// Function to create and initialize a new configuration
    ///
    /// Reads the TOML file at `path` (default `$HOME/.sqlvault/sqlvault.toml`, created
    /// from a template when missing) and overlays `SQLVAULT_*` environment variables.
    pub fn new(path: &Option<String>) -> Result<VaultConfig> {
        let mut builder = Config::builder();

        let home_dir = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        let vault_dir = home_dir.join(".sqlvault");

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    builder = builder.add_source(config::File::from(path));
                } else {
                    std::fs::write(path, EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(&vault_dir)
                    .map_err(|e| anyhow!("Unable to create sqlvault directory: {}", e))?;
                let p = vault_dir.join("sqlvault.toml");
                if p.exists() {
                    builder = builder.add_source(config::File::from(p.as_path()));
                } else {
                    std::fs::write(&p, EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file {:?}: {}", p, e))?;
                }
            }
        }

        // E.g., `SQLVAULT_DATABASE_ENGINE=postgresql sqlvault backup`
        builder = builder.add_source(config::Environment::with_prefix("SQLVAULT"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let values = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_values(&values)
    }

    /// Build a configuration from flat key/value settings, filling in defaults
    pub fn from_values(values: &HashMap<String, String>) -> Result<VaultConfig> {
        let defaults = VaultConfig::default();
        let get = |key: &str| values.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let database_port = match get("database_port") {
            Some(p) => p
                .parse()
                .map_err(|e| anyhow!("Invalid database_port '{}': {}", p, e))?,
            None => defaults.database_port,
        };

        let max_backups = match get("max_backups") {
            Some(n) => n
                .parse()
                .map_err(|e| anyhow!("Invalid max_backups '{}': {}", n, e))?,
            None => defaults.max_backups,
        };
        if max_backups == 0 {
            return Err(anyhow!("max_backups must be at least 1"));
        }

        let media_root = get("media_root")
            .map(expand_home)
            .unwrap_or(defaults.media_root);
        let backup_root = get("backup_root")
            .map(expand_home)
            .unwrap_or_else(|| media_root.join("backups"));

        Ok(VaultConfig {
            database_engine: get("database_engine")
                .map(str::to_string)
                .unwrap_or(defaults.database_engine),
            database_host: get("database_host")
                .map(str::to_string)
                .unwrap_or(defaults.database_host),
            database_port,
            database_name: get("database_name")
                .map(|n| expand_home(n).to_string_lossy().to_string())
                .unwrap_or(defaults.database_name),
            database_user: get("database_user").map(str::to_string).unwrap_or_default(),
            database_password: get("database_password")
                .map(str::to_string)
                .unwrap_or_default(),
            media_root,
            backup_root,
            exclude_tables: split_list(get("exclude_tables")),
            exclude_prefixes: split_list(get("exclude_prefixes")),
            max_backups,
        })
    }

    /// Path of the catalog database recording backups and restores
    pub fn catalog_path(&self) -> PathBuf {
        self.backup_root.join("catalog.sqlite3")
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let password = if self.database_password.is_empty() {
            "(none)"
        } else {
            "********"
        };
        let mut lines = vec![
            format!("Database Engine:    {}", self.database_engine),
            format!("Database Name:      {}", self.database_name),
            format!(
                "Database Server:    {}:{}",
                self.database_host, self.database_port
            ),
            format!("Database User:      {}", self.database_user),
            format!("Database Password:  {}", password),
            format!("Media Root:         {}", self.media_root.display()),
            format!("Backup Root:        {}", self.backup_root.display()),
            format!("Max Backups:        {}", self.max_backups),
        ];
        if !self.exclude_tables.is_empty() {
            lines.push(format!(
                "Excluded Tables:    {}",
                self.exclude_tables.join(", ")
            ));
        }
        if !self.exclude_prefixes.is_empty() {
            lines.push(format!(
                "Excluded Prefixes:  {}",
                self.exclude_prefixes.join(", ")
            ));
        }

        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.sqlvault/sqlvault.toml", home_dir)
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
