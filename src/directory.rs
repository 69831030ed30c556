//! Relay directory: the relays we know about and what our own relay
//! listens on.
//!
//! The directory stands in for the network consensus. Connections whose
//! remote end is a known relay are relay-to-relay traffic, anything else
//! leaving an exit is exit traffic. It also supplies the fingerprint,
//! nickname and hostname shown by the non-address listing modes.

use crate::error::{ConnwatchError, Result};
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub fingerprint: String,
    pub nickname: String,
    pub address: IpAddr,
    pub or_port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct RelayDirectory {
    relays: HashMap<(IpAddr, u16), Relay>,
    relays_by_ip: HashMap<IpAddr, Vec<(IpAddr, u16)>>,
    hostnames: HashMap<IpAddr, String>,
}

impl RelayDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses directory lines:
    ///
    /// ```text
    /// relay <fingerprint> <nickname> <address> <or port>
    /// host <address> <hostname>
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let mut directory = Self::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                ["relay", fingerprint, nickname, address, or_port] => {
                    let address = parse_ip(address, line_num)?;
                    let or_port = or_port.parse().map_err(|e| {
                        ConnwatchError::Parse(format!("line {}: bad port: {e}", line_num + 1))
                    })?;
                    directory.add_relay(Relay {
                        fingerprint: fingerprint.to_string(),
                        nickname: nickname.to_string(),
                        address,
                        or_port,
                    });
                }
                ["host", address, hostname] => {
                    let address = parse_ip(address, line_num)?;
                    directory.set_hostname(address, hostname);
                }
                _ => {
                    return Err(ConnwatchError::Parse(format!(
                        "line {}: unrecognized directory entry",
                        line_num + 1
                    )))
                }
            }
        }

        Ok(directory)
    }

    pub fn add_relay(&mut self, relay: Relay) {
        let key = (relay.address, relay.or_port);
        let by_ip = self.relays_by_ip.entry(relay.address).or_default();
        if !by_ip.contains(&key) {
            by_ip.push(key);
        }
        self.relays.insert(key, relay);
    }

    pub fn set_hostname(&mut self, address: IpAddr, hostname: &str) {
        self.hostnames.insert(address, hostname.to_string());
    }

    /// Finds the relay at an endpoint. An exact address and port match wins;
    /// otherwise the address alone is used when only one relay lives there.
    pub fn lookup(&self, address: IpAddr, port: u16) -> Option<&Relay> {
        if let Some(relay) = self.relays.get(&(address, port)) {
            return Some(relay);
        }

        match self.relays_by_ip.get(&address).map(Vec::as_slice) {
            Some([only]) => self.relays.get(only),
            _ => None,
        }
    }

    /// Whether the endpoint is a relay's OR port.
    pub fn is_relay(&self, address: IpAddr, port: u16) -> bool {
        self.relays.contains_key(&(address, port))
    }

    pub fn hostname(&self, address: IpAddr) -> Option<&str> {
        self.hostnames.get(&address).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

fn parse_ip(value: &str, line_num: usize) -> Result<IpAddr> {
    value
        .parse()
        .map_err(|e| ConnwatchError::Parse(format!("line {}: bad address: {e}", line_num + 1)))
}

/// Ports our own relay listens on, used to tell inbound and local traffic
/// apart from outbound connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalRelay {
    pub or_port: Option<u16>,
    pub dir_port: Option<u16>,
    pub control_port: Option<u16>,
    pub socks_port: Option<u16>,
    pub is_exit: bool,
}

/// Everything classification and listing lookups need.
#[derive(Debug, Clone, Default)]
pub struct RelayContext {
    pub directory: RelayDirectory,
    pub local: LocalRelay,
}

impl RelayContext {
    pub fn new(directory: RelayDirectory, local: LocalRelay) -> Self {
        Self { directory, local }
    }
}
