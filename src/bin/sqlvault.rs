use clap::{Parser, Subcommand};
use sqlvault::*;
use tracing::Level;

mod commands;

use commands::backup::BackupArgs;
use commands::config::ConfigArgs;
use commands::delete::DeleteArgs;
use commands::list::ListArgs;
use commands::restore::RestoreArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.sqlvault/sqlvault.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Identity recorded with backups and restores, by default $USER
    #[clap(long, global = true)]
    actor: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the configured database (or archive the media root)
    Backup(BackupArgs),

    /// Clear the configured database and replay a dump into it
    Restore(RestoreArgs),

    /// List recorded backups or restores
    List(ListArgs),

    /// Delete a backup record together with its file
    Delete(DeleteArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level TRACE or higher.
            .with_max_level(Level::INFO)
            .init();
    }

    let config = match VaultConfig::new(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let actor = cli
        .actor
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());
    let format = cli.format;

    let result = match cli.command {
        // no catalog needed, works before the backup root exists
        Commands::Config(args) => commands::config::run(&config, args, format).map(|_| 0),
        command => run_with_vault(config, command, &actor, format),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_with_vault(
    config: VaultConfig,
    command: Commands,
    actor: &str,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let vault = Vault::new(config)?;
    match command {
        Commands::Backup(args) => commands::backup::run(&vault, args, actor, format).map(|_| 0),
        Commands::Restore(args) => {
            let clean = commands::restore::run(&vault, args, actor, format)?;
            Ok(if clean { 0 } else { 2 })
        }
        Commands::List(args) => commands::list::run(&vault, args, format).map(|_| 0),
        Commands::Delete(args) => commands::delete::run(&vault, args, format).map(|_| 0),
        Commands::Config(args) => commands::config::run(vault.config(), args, format).map(|_| 0),
    }
}
