use super::print_json;
use clap::Args;
use sqlvault::{OutputFormat, Vault};

/// Arguments for the Delete command
#[derive(Args)]
pub struct DeleteArgs {
    /// Backup record id, as shown by `sqlvault list`
    #[clap(value_name = "ID")]
    pub id: i64,
}

pub fn run(vault: &Vault, args: DeleteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let record = vault.delete_backup(args.id)?;
    if !print_json(format, &record)? {
        println!("Deleted {} backup {} (id {})", record.category, record.file, record.id);
    }
    Ok(())
}
