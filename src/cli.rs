use crate::error::{ConnwatchError, Result};
use crate::validation;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "connwatch", about = "A live monitor for the connections held by a relay process")]
#[command(version, long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.connwatch, then ~/.arm/armrc)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pid of the relay process (default: look it up by name)
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Name of the relay process
    #[arg(short = 'n', long = "process")]
    pub process: Option<String>,

    /// Seconds between connection polls
    #[arg(short = 't', long = "refresh-rate")]
    pub refresh_rate: Option<u64>,

    /// What identifies each connection in the listing
    #[arg(short, long, value_enum)]
    pub listing: Option<ListingArg>,

    /// Sort order as attribute indices: 0=category 1=uptime 2=listing
    /// 3=ip-address 4=port 5=hostname 6=fingerprint 7=nickname
    #[arg(short, long, value_delimiter = ',')]
    pub order: Vec<usize>,

    /// Read connections from a file instead of /proc
    #[arg(long)]
    pub connections_file: Option<PathBuf>,

    /// Relay directory used to classify and name connections
    #[arg(short, long)]
    pub directory_file: Option<PathBuf>,

    /// Write log messages to this file
    #[arg(short = 'f', long = "log-file")]
    pub log_file: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print the connection listing once and exit (no TUI)
    #[arg(long)]
    pub snapshot: bool,

    /// Line width used by --snapshot
    #[arg(long, default_value = "100")]
    pub width: usize,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingArg {
    #[value(name = "address")]
    Address,
    #[value(name = "hostname")]
    Hostname,
    #[value(name = "fingerprint")]
    Fingerprint,
    #[value(name = "nickname")]
    Nickname,
}

impl ListingArg {
    /// Index in the `ListingType` configuration enumeration.
    #[must_use]
    pub fn index(&self) -> i64 {
        match self {
            Self::Address => 0,
            Self::Hostname => 1,
            Self::Fingerprint => 2,
            Self::Nickname => 3,
        }
    }
}

impl Args {
    /// Rejects out of range values given on the command line.
    pub fn validate(&self) -> Result<()> {
        if let Some(refresh_rate) = self.refresh_rate {
            validation::validate_refresh_rate(refresh_rate)?;
        }

        if !self.order.is_empty() {
            validation::validate_sort_order(&self.order)?;
        }

        if let Some(process) = &self.process {
            validation::validate_process_name(process)?;
        }

        if let Some(log_file) = &self.log_file {
            validation::validate_file_path(log_file, Some("log"))?;
        }

        self.log_level_filter()?;

        if self.width == 0 {
            return Err(ConnwatchError::Config("Width must be positive".to_string()));
        }

        Ok(())
    }

    pub fn log_level_filter(&self) -> Result<log::LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| ConnwatchError::Config(format!("Unknown log level '{}'", self.log_level)))
    }
}
