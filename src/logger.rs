//! Diagnostic logging through the `log` facade.
//!
//! The terminal belongs to the dashboard while it runs, so in TUI mode
//! messages only go anywhere when a log file was given.

use crate::validation;
use chrono::Local;
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;

/// Installs the global logger. `RUST_LOG` refines `level` when set.
pub fn init(path: Option<&str>, level: LevelFilter, tui: bool) -> anyhow::Result<()> {
    if path.is_none() && tui {
        return Ok(());
    }

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    match path {
        Some(path) => {
            validation::validate_file_path(path, Some("log"))?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    // a second init (tests, embedding) keeps the first logger
    if builder.try_init().is_err() {
        log::debug!("Logger already installed");
    }

    Ok(())
}
