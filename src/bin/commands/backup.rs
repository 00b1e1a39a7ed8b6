use super::{print_json, print_table, spinner};
use clap::Args;
use sqlvault::{format_size, BackupRecord, OutputFormat, Vault};

/// Arguments for the Backup command
#[derive(Args)]
pub struct BackupArgs {
    /// Archive the media root instead of dumping the database
    #[clap(long)]
    pub media: bool,
}

pub fn run(vault: &Vault, args: BackupArgs, actor: &str, format: OutputFormat) -> anyhow::Result<()> {
    if args.media {
        let pb = spinner("Archiving media root");
        let outcome = vault.backup_media(actor);
        pb.finish_and_clear();
        let outcome = outcome?;

        if print_json(format, &outcome)? {
            return Ok(());
        }
        println!("Media backup:   {}", outcome.record.file);
        println!(
            "Files:          {} ({})",
            outcome.report.files,
            format_size(outcome.report.bytes)
        );
        print_evicted(&outcome.evicted);
        return Ok(());
    }

    let pb = spinner("Dumping database");
    let outcome = vault.backup_database(actor);
    pb.finish_and_clear();
    let outcome = outcome?;

    if print_json(format, &outcome)? {
        return Ok(());
    }

    let report = &outcome.report;
    println!("Database backup: {}", outcome.record.file);
    println!(
        "Dialect:         {} ({} tables, {} rows, {} skipped)",
        report.dialect,
        report.tables.len(),
        report.total_rows(),
        report.skipped_tables.len()
    );
    if !report.tables.is_empty() {
        print_table(format, &report.tables);
    }
    if !report.is_complete() {
        eprintln!("{} tables could not be dumped:", report.failed_tables.len());
        print_table(format, &report.failed_tables);
    }
    print_evicted(&outcome.evicted);
    Ok(())
}

fn print_evicted(evicted: &[BackupRecord]) {
    for record in evicted {
        println!("Removed old backup {} (id {})", record.file, record.id);
    }
}
