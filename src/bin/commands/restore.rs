use super::{print_json, print_table, spinner};
use clap::Args;
use sqlvault::{format_size, OutputFormat, Vault};
use std::path::PathBuf;

/// Arguments for the Restore command
#[derive(Args)]
pub struct RestoreArgs {
    /// Dump file (or media archive), absolute or relative to the media root
    #[clap(value_name = "FILE")]
    pub file: PathBuf,

    /// Extract a media archive instead of restoring the database
    #[clap(long)]
    pub media: bool,
}

/// Returns whether the restore completed without failures
pub fn run(vault: &Vault, args: RestoreArgs, actor: &str, format: OutputFormat) -> anyhow::Result<bool> {
    let RestoreArgs { file, media } = args;

    if media {
        let pb = spinner("Extracting media archive");
        let outcome = vault.restore_media(&file, actor);
        pb.finish_and_clear();
        let outcome = outcome?;

        if !print_json(format, &outcome)? {
            println!(
                "Restored {} files ({}) from {}",
                outcome.report.files,
                format_size(outcome.report.bytes),
                outcome.record.file
            );
        }
        return Ok(true);
    }

    let pb = spinner("Restoring database");
    let outcome = vault.restore_database(&file, actor);
    pb.finish_and_clear();
    let outcome = outcome?;
    let report = &outcome.report;

    if print_json(format, &outcome)? {
        return Ok(report.is_clean());
    }

    println!("Restored from:   {}", outcome.record.file);
    println!("Tables cleared:  {}", report.cleared_tables.len());
    println!("Tables skipped:  {}", report.skipped_tables.len());
    println!("Statements:      {}", report.applied_statements);
    if report.deferred_statements > 0 {
        println!("  on retry:      {}", report.deferred_statements);
    }

    if !report.failed_clears.is_empty() {
        eprintln!("{} tables could not be cleared:", report.failed_clears.len());
        print_table(format, &report.failed_clears);
    }
    if !report.failed_statements.is_empty() {
        eprintln!("{} statements failed:", report.failed_statements.len());
        print_table(format, &report.failed_statements);
    }

    Ok(report.is_clean())
}
