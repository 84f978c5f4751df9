//! Logging setup for `steward` using `log` + `env_logger`.
//!
//! The progress table owns stdout, so records go to a log file. With
//! `--log-console` they are copied to stderr as well.
//!
//! Priority for determining the log level:
//! 1. `-v`/`-q` CLI flags (if given)
//! 2. `STEWARD_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`

use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

pub const LEVEL_ENV: &str = "STEWARD_LOG";

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub verbose: u8,
    pub quiet: bool,
    pub file: PathBuf,
    pub console: bool,
}

/// Flushes the logger when dropped. Keep it alive until the final table
/// has been drawn.
#[must_use = "dropping the guard early flushes the logger too soon"]
pub struct LogGuard {
    file: PathBuf,
}

impl LogGuard {
    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        log::logger().flush();
    }
}

/// Install the global logger. Call once, before any host task starts.
pub fn init(options: &LogOptions) -> Result<LogGuard> {
    let env = std::env::var(LEVEL_ENV).ok();
    let level = resolve_level(options.verbose, options.quiet, env.as_deref());

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&options.file)
        .with_context(|| format!("Could not open log file: {}", options.file.display()))?;
    let sink = Tee {
        file: LineWriter::new(file),
        console: options.console.then(io::stderr),
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .format_target(false)
        .target(env_logger::Target::Pipe(Box::new(sink)))
        .try_init()
        .context("Logger already initialized")?;

    log::debug!("logging at {level} to {}", options.file.display());
    Ok(LogGuard {
        file: options.file.clone(),
    })
}

/// Level from flags, then the environment, then `info`.
pub fn resolve_level(verbose: u8, quiet: bool, env: Option<&str>) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => env.and_then(parse_level).unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// Writes every record to the log file and, optionally, to stderr.
struct Tee {
    file: LineWriter<File>,
    console: Option<io::Stderr>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if let Some(console) = &mut self.console {
            // A closed stderr must not stop file logging.
            let _ = console.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(console) = &mut self.console {
            let _ = console.flush();
        }
        self.file.flush()
    }
}
