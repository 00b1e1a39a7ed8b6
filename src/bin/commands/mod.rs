pub mod backup;
pub mod config;
pub mod delete;
pub mod list;
pub mod restore;

use serde::Serialize;
use sqlvault::OutputFormat;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Spinner on stderr while a long operation runs
pub(crate) fn spinner(message: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print `value` as JSON when a JSON format is selected; returns whether it did
pub(crate) fn print_json<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<bool> {
    match format.render_json(value) {
        Some(json) => {
            println!("{}", json?);
            Ok(true)
        }
        None => Ok(false),
    }
}

pub(crate) fn print_table<T: Tabled>(format: OutputFormat, rows: &[T]) {
    match format {
        OutputFormat::Markdown => println!("{}", Table::new(rows).with(Style::markdown())),
        _ => println!("{}", Table::new(rows).with(Style::rounded())),
    }
}
