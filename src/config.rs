use crate::cli::Args;
use crate::directory::LocalRelay;
use crate::entries::{ListingMode, SortAttr, DEFAULT_SORT_ORDER};
use crate::validation;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

fn default_order() -> Vec<usize> {
    DEFAULT_SORT_ORDER
        .iter()
        .filter_map(|attr| SortAttr::ALL.iter().position(|a| a == attr))
        .collect()
}

fn default_process_name() -> String {
    "tor".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "ListingType")]
    pub listing_type: i64,

    #[serde(rename = "RefreshRate")]
    pub refresh_rate: u64,

    #[serde(rename = "Order")]
    pub order: Vec<usize>,

    #[serde(rename = "ProcessName")]
    pub process_name: String,

    #[serde(rename = "ResolveInterval")]
    pub resolve_interval: u64,

    #[serde(rename = "OrPort")]
    pub or_port: Option<u16>,

    #[serde(rename = "DirPort")]
    pub dir_port: Option<u16>,

    #[serde(rename = "ControlPort")]
    pub control_port: Option<u16>,

    #[serde(rename = "SocksPort")]
    pub socks_port: Option<u16>,

    #[serde(rename = "IsExit")]
    pub is_exit: bool,

    #[serde(rename = "DirectoryFile")]
    pub directory_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_type: 0,
            refresh_rate: 10,
            order: default_order(),
            process_name: default_process_name(),
            resolve_interval: 5,
            or_port: None,
            dir_port: None,
            control_port: None,
            socks_port: None,
            is_exit: false,
            directory_file: None,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // ~/.connwatch (TOML) first, then an arm style ~/.arm/armrc
        if let Some(home) = dirs::home_dir() {
            let modern_config = home.join(".connwatch");
            let legacy_config = home.join(".arm").join("armrc");

            if modern_config.exists() {
                return Self::load_from(&modern_config);
            } else if legacy_config.exists() {
                return Self::parse_armrc_format(&legacy_config);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        validation::validate_process_name(&config.process_name)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(listing) = &args.listing {
            self.listing_type = listing.index();
        }
        if let Some(refresh_rate) = args.refresh_rate {
            self.refresh_rate = refresh_rate;
        }
        if !args.order.is_empty() {
            self.order = args.order.clone();
        }
        if let Some(process) = &args.process {
            self.process_name = process.clone();
        }
        if let Some(directory_file) = &args.directory_file {
            self.directory_file = Some(directory_file.display().to_string());
        }
    }

    #[must_use]
    pub fn local_relay(&self) -> LocalRelay {
        LocalRelay {
            or_port: self.or_port,
            dir_port: self.dir_port,
            control_port: self.control_port,
            socks_port: self.socks_port,
            is_exit: self.is_exit,
        }
    }

    fn parse_armrc_format(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse_armrc(&content))
    }

    /// Reads the connection panel keys of an armrc file:
    /// `features.connection.<key> <value>`. Other keys are ignored and
    /// unparsable values keep their defaults.
    pub fn parse_armrc(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let value = value.trim();

            match key {
                "features.connection.listingType" => match value.parse() {
                    Ok(listing_type) => config.listing_type = listing_type,
                    Err(_) => log::warn!("Ignoring listingType '{value}'"),
                },
                "features.connection.refreshRate" => match value.parse() {
                    Ok(refresh_rate) => config.refresh_rate = refresh_rate,
                    Err(_) => log::warn!("Ignoring refreshRate '{value}'"),
                },
                "features.connection.order" => {
                    let order: Result<Vec<usize>, _> =
                        value.split(',').map(|v| v.trim().parse()).collect();
                    match order {
                        Ok(order) => config.order = order,
                        Err(_) => log::warn!("Ignoring order '{value}'"),
                    }
                }
                _ => {}
            }
        }

        config
    }
}

/// Panel options after range checks. Built once at startup so the panel
/// never has to validate them.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSettings {
    pub listing_mode: ListingMode,
    pub refresh_rate: Duration,
    pub sort_order: Vec<SortAttr>,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PanelSettings {
    pub fn from_config(config: &Config) -> Self {
        let sort_order = match validation::validate_sort_order(&config.order) {
            Ok(order) => order,
            Err(e) => {
                log::warn!("{e}, using the default ordering");
                DEFAULT_SORT_ORDER.to_vec()
            }
        };

        Self {
            listing_mode: ListingMode::from_index_clamped(config.listing_type),
            refresh_rate: Duration::from_secs(config.refresh_rate.clamp(
                validation::MIN_REFRESH_RATE,
                validation::MAX_REFRESH_RATE,
            )),
            sort_order,
        }
    }
}
