//! Resolves the connections held by a running process from `/proc`.
//!
//! The relay process is found by pid or by its command name. Its socket
//! inodes are collected from `/proc/<pid>/fd` and matched against the
//! established rows of `/proc/net/tcp` and `/proc/net/tcp6`.

use crate::error::{ConnwatchError, Result};
use crate::source::{ConnTuple, ConnectionSource};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TCP state code for ESTABLISHED in `/proc/net/tcp`.
const TCP_ESTABLISHED: &str = "01";

/// One row of `/proc/net/tcp{,6}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpRow {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub state: String,
    pub inode: u64,
}

impl TcpRow {
    pub fn is_established(&self) -> bool {
        self.state == TCP_ESTABLISHED
    }
}

pub struct ProcResolver {
    process_name: String,
    pid: Option<u32>,
    resolve_interval: Duration,
    inner: Mutex<ResolverState>,
}

#[derive(Default)]
struct ResolverState {
    revision: u64,
    last_resolve: Option<Instant>,
    connections: Vec<ConnTuple>,
}

impl ProcResolver {
    pub fn new(process_name: &str, pid: Option<u32>, resolve_interval: Duration) -> Result<Self> {
        if !cfg!(target_os = "linux") {
            return Err(ConnwatchError::Platform(
                "Connection resolution requires Linux /proc, use --connections-file instead"
                    .to_string(),
            ));
        }

        Ok(Self {
            process_name: process_name.to_string(),
            pid,
            resolve_interval,
            inner: Mutex::new(ResolverState::default()),
        })
    }

    fn resolve(&self) -> Result<Vec<ConnTuple>> {
        let pid = match self.pid {
            Some(pid) => pid,
            None => find_process(&self.process_name)?,
        };

        let inodes = socket_inodes(pid)?;
        let mut connections = Vec::new();

        for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
            // tcp6 is absent when IPv6 is disabled
            let Ok(content) = fs::read_to_string(table) else {
                continue;
            };

            for row in parse_tcp_table(&content) {
                if row.is_established() && inodes.contains(&row.inode) {
                    connections.push(ConnTuple::new(row.local, row.remote));
                }
            }
        }

        log::trace!(
            "Resolved {} connections for pid {pid} ({} sockets)",
            connections.len(),
            inodes.len()
        );
        Ok(connections)
    }
}

impl ConnectionSource for ProcResolver {
    fn resolution_count(&self) -> u64 {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };

        let due = inner
            .last_resolve
            .map_or(true, |last| last.elapsed() >= self.resolve_interval);

        if due {
            inner.last_resolve = Some(Instant::now());
            match self.resolve() {
                Ok(connections) => {
                    inner.connections = connections;
                    inner.revision += 1;
                }
                Err(e) => log::warn!("Connection resolution failed: {e}"),
            }
        }

        inner.revision
    }

    fn connections(&self) -> Vec<ConnTuple> {
        self.inner
            .lock()
            .map(|inner| inner.connections.clone())
            .unwrap_or_default()
    }
}

/// Finds the pid of the first process whose command name matches.
pub fn find_process(name: &str) -> Result<u32> {
    let mut matches = Vec::new();

    for entry in fs::read_dir("/proc")?.flatten() {
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        let Ok(pid) = file_name.parse::<u32>() else {
            continue;
        };

        if let Ok(comm) = fs::read_to_string(format!("/proc/{pid}/comm")) {
            if comm.trim() == name {
                matches.push(pid);
            }
        }
    }

    matches.sort_unstable();
    if matches.len() > 1 {
        log::debug!("Multiple '{name}' processes, using pid {}", matches[0]);
    }

    matches
        .first()
        .copied()
        .ok_or_else(|| ConnwatchError::ProcessNotFound(name.to_string()))
}

/// Socket inodes open in a process, from its `fd` links.
pub fn socket_inodes(pid: u32) -> Result<HashSet<u64>> {
    let mut inodes = HashSet::new();

    for entry in fs::read_dir(format!("/proc/{pid}/fd"))?.flatten() {
        if let Ok(target) = fs::read_link(entry.path()) {
            if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                inodes.insert(inode);
            }
        }
    }

    Ok(inodes)
}

/// Parses an fd link target of the form `socket:[12345]`.
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Parses the rows of a `/proc/net/tcp{,6}` table, skipping the header and
/// any malformed rows.
pub fn parse_tcp_table(content: &str) -> Vec<TcpRow> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| parse_tcp_row(line).ok())
        .collect()
}

pub fn parse_tcp_row(line: &str) -> Result<TcpRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return Err(ConnwatchError::Parse(format!(
            "expected at least 10 fields, got {}",
            fields.len()
        )));
    }

    let local = parse_hex_socket_addr(fields[1])?;
    let remote = parse_hex_socket_addr(fields[2])?;
    let inode = fields[9]
        .parse()
        .map_err(|e| ConnwatchError::Parse(format!("bad inode '{}': {e}", fields[9])))?;

    Ok(TcpRow {
        local,
        remote,
        state: fields[3].to_string(),
        inode,
    })
}

/// Parses the kernel's `ADDR:PORT` hex notation. Addresses are written as
/// 32-bit words in host byte order.
pub fn parse_hex_socket_addr(addr_str: &str) -> Result<SocketAddr> {
    let (ip_hex, port_hex) = addr_str
        .split_once(':')
        .ok_or_else(|| ConnwatchError::Parse(format!("bad socket address '{addr_str}'")))?;

    if !ip_hex.is_ascii() {
        return Err(ConnwatchError::Parse(format!("bad address '{ip_hex}'")));
    }

    let port = u16::from_str_radix(port_hex, 16)
        .map_err(|e| ConnwatchError::Parse(format!("bad port '{port_hex}': {e}")))?;

    let ip = match ip_hex.len() {
        8 => IpAddr::V4(hex_word(ip_hex)?.into()),
        32 => {
            let mut bytes = [0u8; 16];
            for (i, chunk) in bytes.chunks_mut(4).enumerate() {
                chunk.copy_from_slice(&hex_word(&ip_hex[i * 8..i * 8 + 8])?);
            }
            IpAddr::V6(bytes.into())
        }
        _ => {
            return Err(ConnwatchError::Parse(format!(
                "bad address length in '{addr_str}'"
            )))
        }
    };

    Ok(SocketAddr::new(ip, port))
}

fn hex_word(hex: &str) -> Result<[u8; 4]> {
    u32::from_str_radix(hex, 16)
        .map(u32::to_ne_bytes)
        .map_err(|e| ConnwatchError::Parse(format!("bad hex word '{hex}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:2329 00000000:0000 0A 00000000:00000000 00:00000000 00000000   110        0 20001 1 0000000000000000 100 0 0 10 0
   1: 0100007F:2329 0500000A:01BB 01 00000000:00000000 00:00000000 00000000   110        0 20002 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:235B 0100007F:C350 01 00000000:00000000 00:00000000 00000000   110        0 20003 1 0000000000000000 20 4 30 10 -1
garbage line
";

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_tcp_table() {
        let rows = parse_tcp_table(TCP_TABLE);
        assert_eq!(rows.len(), 3);

        assert!(!rows[0].is_established());
        assert!(rows[1].is_established());
        assert_eq!(rows[1].local.to_string(), "127.0.0.1:9001");
        assert_eq!(rows[1].remote.to_string(), "10.0.0.5:443");
        assert_eq!(rows[1].inode, 20002);
        assert_eq!(rows[2].remote.port(), 50000);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_ipv6_loopback() {
        let addr = parse_hex_socket_addr("00000000000000000000000001000000:2329").unwrap();
        assert_eq!(addr.to_string(), "[::1]:9001");
    }

    #[test]
    fn test_parse_hex_socket_addr_rejects_garbage() {
        assert!(parse_hex_socket_addr("").is_err());
        assert!(parse_hex_socket_addr("0100007F").is_err());
        assert!(parse_hex_socket_addr("0100007F:ZZZZ").is_err());
        assert!(parse_hex_socket_addr("0100:2329").is_err());
        assert!(parse_hex_socket_addr("0100007G:2329").is_err());
    }

    #[test]
    fn test_parse_socket_link() {
        assert_eq!(parse_socket_link("socket:[20002]"), Some(20002));
        assert_eq!(parse_socket_link("pipe:[20002]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
        assert_eq!(parse_socket_link("socket:[]"), None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_missing_process_keeps_revision() {
        let resolver =
            ProcResolver::new("connwatch-no-such-process", None, Duration::ZERO).unwrap();
        assert_eq!(resolver.resolution_count(), 0);
        assert_eq!(resolver.resolution_count(), 0);
        assert!(resolver.connections().is_empty());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_resolves_at_most_once_per_interval() {
        let resolver =
            ProcResolver::new("connwatch", Some(std::process::id()), Duration::from_secs(3600))
                .unwrap();
        assert_eq!(resolver.resolution_count(), 1);
        assert_eq!(resolver.resolution_count(), 1);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_failed_resolution_keeps_previous_result() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let resolver = ProcResolver::new("sleep", Some(child.id()), Duration::ZERO).unwrap();
        assert_eq!(resolver.resolution_count(), 1);
        let before = resolver.connections();

        child.kill().unwrap();
        child.wait().unwrap();
        assert_eq!(resolver.resolution_count(), 1);
        assert_eq!(resolver.connections(), before);
    }
}
