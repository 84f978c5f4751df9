//! Live progress table.
//!
//! The engine calls [`ProgressReporter::render`] after every state change
//! while holding the lock that guards the table, so each frame is a
//! consistent snapshot.

use crate::engine::status::{ProgressTable, Status};
use colored::{ColoredString, Colorize};
use console::{Alignment, Term, pad_str};
use std::io::{self, Write};

pub trait ProgressReporter: Send + Sync {
    fn render(&self, table: &ProgressTable);
}

/// Reporter that draws nothing (quiet mode, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn render(&self, _table: &ProgressTable) {}
}

const HEADERS: [&str; 5] = ["HOST", "PACKAGES", "CONFIGURATION", "COMMANDS", "STATUS"];
const GAP: usize = 2;

/// Clears the terminal and redraws the whole table on stdout.
pub struct TableReporter {
    term: Term,
    clear: bool,
}

impl TableReporter {
    pub fn new() -> Self {
        let term = Term::stdout();
        let clear = term.is_term();
        Self { term, clear }
    }

    fn draw(&self, table: &ProgressTable) -> io::Result<()> {
        if self.clear {
            self.term.clear_screen()?;
        }
        let mut out = io::stdout().lock();
        out.write_all(format_table(table).as_bytes())?;
        out.flush()
    }
}

impl Default for TableReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TableReporter {
    fn render(&self, table: &ProgressTable) {
        if let Err(e) = self.draw(table) {
            log::debug!("progress redraw failed: {e}");
        }
    }
}

/// Text of one frame. Cells are padded before they are coloured, so colour
/// codes never shift the columns.
pub fn format_table(table: &ProgressTable) -> String {
    let rows: Vec<[String; 5]> = table
        .rows
        .iter()
        .map(|row| {
            [
                row.host.clone(),
                row.packages.to_string(),
                row.templates.to_string(),
                row.commands.to_string(),
                row.status.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.len());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = format!(
        "Total Tasks: {}  Completed Tasks: {}\n\n",
        table.total, table.completed
    );
    out.push_str(&join_row(&HEADERS.map(|h| h.to_string()), &widths, |_, cell| {
        cell.bold()
    }));
    for (row, status) in rows.iter().zip(table.rows.iter().map(|r| r.status)) {
        out.push_str(&join_row(row, &widths, |column, cell| {
            if column == HEADERS.len() - 1 {
                paint(status, cell)
            } else {
                cell.normal()
            }
        }));
    }
    out
}

fn join_row(
    cells: &[String; 5],
    widths: &[usize; 5],
    style: impl Fn(usize, &str) -> ColoredString,
) -> String {
    let mut line = String::new();
    for (column, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let last = column == cells.len() - 1;
        let padded = if last {
            cell.clone()
        } else {
            pad_str(cell, width + GAP, Alignment::Left, None).into_owned()
        };
        line.push_str(&style(column, &padded).to_string());
    }
    line.push('\n');
    line
}

fn paint(status: Status, cell: &str) -> ColoredString {
    match status {
        Status::Pending => cell.dimmed(),
        Status::InProgress => cell.cyan(),
        Status::Error => cell.red().bold(),
        Status::Completed => cell.green(),
    }
}
