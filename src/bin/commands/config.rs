use clap::Args;
use serde::Serialize;
use sqlvault::{format_size, OutputFormat, VaultConfig};
use std::path::Path;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also list the files currently in the backup root
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    database: DatabaseInfo,
    media_root: String,
    backup_root: String,
    max_backups: usize,
    exclude_tables: Vec<String>,
    exclude_prefixes: Vec<String>,
    catalog: CatalogInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<FileInfo>>,
}

#[derive(Debug, Serialize)]
struct DatabaseInfo {
    engine: String,
    name: String,
    host: String,
    port: u16,
    user: String,
    password_set: bool,
}

#[derive(Debug, Serialize)]
struct CatalogInfo {
    path: String,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    name: String,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
}

pub fn run(config: &VaultConfig, args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ConfigArgs { verbose } = args;

    let catalog_path = config.catalog_path();
    let catalog_exists = catalog_path.exists();
    let catalog_size = if catalog_exists {
        std::fs::metadata(&catalog_path).ok().map(|m| m.len())
    } else {
        None
    };

    let files = verbose.then(|| list_files(&config.backup_root));

    let info = ConfigInfo {
        config_file: VaultConfig::config_file_path(),
        database: DatabaseInfo {
            engine: config.database_engine.clone(),
            name: config.database_name.clone(),
            host: config.database_host.clone(),
            port: config.database_port,
            user: config.database_user.clone(),
            password_set: !config.database_password.is_empty(),
        },
        media_root: config.media_root.to_string_lossy().to_string(),
        backup_root: config.backup_root.to_string_lossy().to_string(),
        max_backups: config.max_backups,
        exclude_tables: config.exclude_tables.clone(),
        exclude_prefixes: config.exclude_prefixes.clone(),
        catalog: CatalogInfo {
            path: catalog_path.to_string_lossy().to_string(),
            exists: catalog_exists,
            size_bytes: catalog_size,
        },
        files,
    };

    if super::print_json(format, &info)? {
        return Ok(());
    }

    println!("sqlvault Configuration");
    println!("======================\n");
    println!("Config file:        {}", info.config_file);
    println!("{}", config.summary());
    println!();

    println!("Catalog:");
    println!("  Path:             {}", info.catalog.path);
    println!(
        "  Status:           {}",
        if info.catalog.exists {
            "exists"
        } else {
            "not created"
        }
    );
    if let Some(size) = info.catalog.size_bytes {
        println!("  Size:             {}", format_size(size));
    }

    if let Some(ref files) = info.files {
        println!();
        println!("Backup Root Files:");
        println!("  {:<40} {:>12}  {}", "Name", "Size", "Modified");
        println!("  {}", "-".repeat(80));
        for file in files {
            println!(
                "  {:<40} {:>12}  {}",
                file.name,
                format_size(file.size_bytes),
                file.modified.as_deref().unwrap_or("-")
            );
        }
    }

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --verbose (-v) to see all files in the backup root");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Set SQLVAULT_* environment variables to override settings");
    Ok(())
}

fn list_files(dir: &Path) -> Vec<FileInfo> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().ok().map(|t| {
                let datetime: chrono::DateTime<chrono::Local> = t.into();
                datetime.format("%Y-%m-%d %H:%M:%S").to_string()
            });
            files.push(FileInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                size_bytes: metadata.len(),
                modified,
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}
