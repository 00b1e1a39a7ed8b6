use super::{print_json, print_table};
use clap::Args;
use sqlvault::{BackupCategory, OutputFormat, Vault};

/// Arguments for the List command
#[derive(Args)]
pub struct ListArgs {
    /// Only list backups of this category: database, media
    #[clap(long)]
    pub category: Option<BackupCategory>,

    /// List restores instead of backups
    #[clap(long)]
    pub restores: bool,
}

pub fn run(vault: &Vault, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.restores {
        let records = vault.list_restores()?;
        if !print_json(format, &records)? {
            if records.is_empty() {
                println!("No restores recorded");
            } else {
                print_table(format, &records);
            }
        }
        return Ok(());
    }

    let records = vault.list_backups(args.category)?;
    if !print_json(format, &records)? {
        if records.is_empty() {
            println!("No backups recorded");
        } else {
            print_table(format, &records);
        }
    }
    Ok(())
}
