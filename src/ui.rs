//! Terminal messages around an apply run. The live table itself lives in
//! `progress`.

use crate::engine::status::{Status, TaskStatus};
use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// One line per host after the run, with the cause of any failure.
pub fn host_summary(row: &TaskStatus) {
    let counts = format!(
        "packages {}  configuration {}  commands {}",
        row.packages, row.templates, row.commands
    );
    match (&row.status, &row.failure) {
        (Status::Error, Some(failure)) => {
            println!("{} {}  {}", "✗".red(), row.host.bold(), counts.dimmed());
            println!(
                "    {} while {}: {}",
                failure.kind.description().red(),
                failure.phase,
                failure.message
            );
            println!("    {} {}", "→".dimmed(), failure.kind.advice());
        }
        (Status::Completed, _) => {
            println!("{} {}  {}", "✓".green(), row.host.bold(), counts.dimmed());
        }
        (status, _) => {
            println!("{} {}  {}  {}", "•".dimmed(), row.host.bold(), counts.dimmed(), status);
        }
    }
}
