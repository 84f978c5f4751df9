mod cli;
mod commands;
mod config;
mod engine;
mod logging;
mod progress;
mod template;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "steward", &mut io::stdout());
        return Ok(());
    }

    let log_guard = logging::init(&logging::LogOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        file: cli.log_file.clone(),
        console: cli.log_console,
    })?;

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match &cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Validate(args) => commands::validate::run(&ctx, args),
        Command::Host(cmd) => commands::host::run(&ctx, cmd),
        Command::Init { path, force } => commands::init::run(&ctx, path, *force),
        Command::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        log::error!("{e:#}");
        ui::error(&format!("{e:#}"));
        ui::dim(&format!("Details in {}", log_guard.file().display()));
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}
