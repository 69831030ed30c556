//! # connwatch
//!
//! A live terminal monitor for the connections held by a relay process.
//!
//! ## Features
//!
//! - Connections read from `/proc` for a process found by name or pid, or
//!   from a plain text file
//! - Listing kept in sync with each new sample without losing selection,
//!   uptime or category of the connections that stay open
//! - Classification against the relay's own ports and a relay directory
//! - Sorting by up to three attributes, listing by address, hostname,
//!   fingerprint or nickname
//! - arm style configuration (`~/.arm/armrc`) as well as a TOML config
//!
//! ## Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use connwatch::cli::Args;
//! use connwatch::run;
//!
//! let args = Args::parse_from(["connwatch", "--process", "tor", "--refresh-rate", "5"]);
//! run(args).expect("Failed to run connwatch");
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod directory;
pub mod entries;
pub mod error;
pub mod input;
pub mod listing;
pub mod logger;
pub mod panel;
pub mod resolver;
pub mod scroller;
pub mod source;
pub mod validation;

use anyhow::Result;
use cli::Args;
use clock::SystemClock;
use config::{Config, PanelSettings};
use crossterm::{execute, terminal::*};
use directory::{RelayContext, RelayDirectory};
use panel::ConnectionPanel;
use ratatui::{backend::CrosstermBackend, Terminal};
use source::{ConnectionSource, FileSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main entry point for the connwatch application.
///
/// Validates the arguments, merges them over the configuration file and
/// then either prints one snapshot of the listing (`--snapshot`) or runs
/// the interactive dashboard.
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use connwatch::{cli::Args, run};
///
/// let args = Args::parse_from(["connwatch", "--snapshot"]);
/// run(args).expect("Failed to run connwatch");
/// ```
pub fn run(args: Args) -> Result<()> {
    args.validate().map_err(|e| anyhow::anyhow!(e))?;

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_args(&args);

    logger::init(
        args.log_file.as_deref(),
        args.log_level_filter()?,
        !args.snapshot,
    )?;

    let settings = PanelSettings::from_config(&config);
    let context = relay_context(&config)?;
    let source = connection_source(&args, &config)?;
    log::info!(
        "Monitoring {} every {}s",
        args.connections_file
            .as_ref()
            .map_or_else(|| config.process_name.clone(), |p| p.display().to_string()),
        settings.refresh_rate.as_secs()
    );

    let (redraw, redraw_rx) = panel::redraw_channel();
    let mut panel = ConnectionPanel::new(
        source,
        Arc::new(SystemClock),
        context,
        &settings,
        redraw,
    );

    if args.snapshot {
        println!("{}", panel.snapshot(args.width));
        return Ok(());
    }

    panel.start()?;

    let mut terminal = initialize_tui()?;
    let result = dashboard::run_dashboard(&mut terminal, &panel, &redraw_rx);

    // Cleanup
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();

    panel.stop();
    result
}

fn relay_context(config: &Config) -> Result<RelayContext> {
    let directory = match &config.directory_file {
        Some(path) => {
            let directory = RelayDirectory::load(Path::new(path))?;
            log::info!("Loaded {} relays from {path}", directory.len());
            directory
        }
        None => RelayDirectory::new(),
    };

    Ok(RelayContext::new(directory, config.local_relay()))
}

fn connection_source(args: &Args, config: &Config) -> Result<Arc<dyn ConnectionSource>> {
    if let Some(path) = &args.connections_file {
        return Ok(Arc::new(FileSource::new(path)?));
    }

    let resolver = resolver::ProcResolver::new(
        &config.process_name,
        args.pid,
        Duration::from_secs(config.resolve_interval.max(1)),
    )?;
    Ok(Arc::new(resolver))
}

fn initialize_tui() -> Result<Terminal<CrosstermBackend<std::io::Stdout>>> {
    enable_raw_mode()?;

    let mut stdout = std::io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(anyhow::anyhow!("Alternate screen failed: {e}"));
    }

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}
