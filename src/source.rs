//! Connection sources feeding the panel.
//!
//! A source hands out a revision number and the connections it saw at that
//! revision. The panel only re-reads the connections when the revision
//! moves, so a source bumps it whenever it has produced a new sample.

use crate::error::{ConnwatchError, Result};
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

/// Identity of one connection: (local address, local port, remote address,
/// remote port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnTuple {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

impl ConnTuple {
    pub fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            local_addr: local.ip(),
            local_port: local.port(),
            remote_addr: remote.ip(),
            remote_port: remote.port(),
        }
    }

    pub fn local(&self) -> SocketAddr {
        SocketAddr::new(self.local_addr, self.local_port)
    }

    pub fn remote(&self) -> SocketAddr {
        SocketAddr::new(self.remote_addr, self.remote_port)
    }
}

impl fmt::Display for ConnTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", self.local(), self.remote())
    }
}

/// A circuit built by the relay: its id and the relays it passes through,
/// first hop first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitPath {
    pub id: u32,
    pub hops: Vec<String>,
}

pub trait ConnectionSource: Send + Sync {
    /// Monotonic marker that changes whenever a new sample is available.
    fn resolution_count(&self) -> u64;

    /// Connections in the most recent sample, in no particular order.
    fn connections(&self) -> Vec<ConnTuple>;

    /// Circuits in the most recent sample.
    fn circuits(&self) -> Vec<CircuitPath> {
        Vec::new()
    }
}

/// In-memory source, replaced wholesale by its owner.
#[derive(Debug, Default)]
pub struct MemorySource {
    inner: Mutex<MemorySample>,
}

#[derive(Debug, Default)]
struct MemorySample {
    revision: u64,
    connections: Vec<ConnTuple>,
    circuits: Vec<CircuitPath>,
}

impl MemorySource {
    pub fn new(connections: Vec<ConnTuple>) -> Self {
        let source = Self::default();
        source.set_connections(connections);
        source
    }

    /// Publishes a new sample, bumping the revision.
    pub fn set_connections(&self, connections: Vec<ConnTuple>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.connections = connections;
            inner.revision += 1;
        }
    }

    pub fn set_circuits(&self, circuits: Vec<CircuitPath>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.circuits = circuits;
            inner.revision += 1;
        }
    }
}

impl ConnectionSource for MemorySource {
    fn resolution_count(&self) -> u64 {
        self.inner.lock().map(|inner| inner.revision).unwrap_or(0)
    }

    fn connections(&self) -> Vec<ConnTuple> {
        self.inner
            .lock()
            .map(|inner| inner.connections.clone())
            .unwrap_or_default()
    }

    fn circuits(&self) -> Vec<CircuitPath> {
        self.inner
            .lock()
            .map(|inner| inner.circuits.clone())
            .unwrap_or_default()
    }
}

/// Source backed by a text file, re-read on every revision check.
///
/// Each non-comment line is either a connection, `<local> <remote>` with
/// both sides written as socket addresses (`127.0.0.1:9051`,
/// `[::1]:9051`), or a circuit, `circuit <id> <hop> [<hop> ...]`.
pub struct FileSource {
    path: PathBuf,
    inner: Mutex<FileSample>,
}

#[derive(Default)]
struct FileSample {
    revision: u64,
    content: Option<String>,
    connections: Vec<ConnTuple>,
    circuits: Vec<CircuitPath>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let source = Self {
            path,
            inner: Mutex::new(FileSample::default()),
        };
        source.refresh()?;
        Ok(source)
    }

    fn refresh(&self) -> Result<()> {
        let content = fs::read_to_string(&self.path)?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| ConnwatchError::Platform("file source lock poisoned".to_string()))?;

        if inner.content.as_deref() != Some(content.as_str()) {
            let (connections, circuits) = parse_sample(&content);
            log::debug!(
                "{}: {} connections, {} circuits",
                self.path.display(),
                connections.len(),
                circuits.len()
            );
            inner.connections = connections;
            inner.circuits = circuits;
            inner.content = Some(content);
            inner.revision += 1;
        }

        Ok(())
    }
}

impl ConnectionSource for FileSource {
    fn resolution_count(&self) -> u64 {
        if let Err(e) = self.refresh() {
            log::warn!("Unable to read {}: {e}", self.path.display());
        }
        self.inner.lock().map(|inner| inner.revision).unwrap_or(0)
    }

    fn connections(&self) -> Vec<ConnTuple> {
        self.inner
            .lock()
            .map(|inner| inner.connections.clone())
            .unwrap_or_default()
    }

    fn circuits(&self) -> Vec<CircuitPath> {
        self.inner
            .lock()
            .map(|inner| inner.circuits.clone())
            .unwrap_or_default()
    }
}

/// Parses the connections file format. Malformed lines are logged and
/// skipped.
pub fn parse_sample(content: &str) -> (Vec<ConnTuple>, Vec<CircuitPath>) {
    let mut connections = Vec::new();
    let mut circuits = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed = if line.starts_with("circuit ") {
            parse_circuit_line(line).map(|circuit| circuits.push(circuit))
        } else {
            parse_connection_line(line).map(|conn| connections.push(conn))
        };

        if let Err(e) = parsed {
            log::warn!("Skipping line {}: {e}", line_num + 1);
        }
    }

    (connections, circuits)
}

pub fn parse_connection_line(line: &str) -> Result<ConnTuple> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(ConnwatchError::Parse(format!(
            "expected '<local> <remote>', got '{line}'"
        )));
    }

    let local = SocketAddr::from_str(fields[0])
        .map_err(|e| ConnwatchError::Parse(format!("bad local address '{}': {e}", fields[0])))?;
    let remote = SocketAddr::from_str(fields[1])
        .map_err(|e| ConnwatchError::Parse(format!("bad remote address '{}': {e}", fields[1])))?;

    Ok(ConnTuple::new(local, remote))
}

fn parse_circuit_line(line: &str) -> Result<CircuitPath> {
    let mut fields = line.split_whitespace().skip(1);
    let id = fields
        .next()
        .ok_or_else(|| ConnwatchError::Parse("circuit line without an id".to_string()))?
        .parse()
        .map_err(|e| ConnwatchError::Parse(format!("bad circuit id: {e}")))?;
    let hops: Vec<String> = fields.map(String::from).collect();

    if hops.is_empty() {
        return Err(ConnwatchError::Parse(format!("circuit {id} has no hops")));
    }

    Ok(CircuitPath { id, hops })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_sample_mixed_lines() {
        let content = "\
# relay connections
127.0.0.1:9001 10.0.0.5:443
[::1]:9051 [::1]:51234
circuit 7 relayA relayB relayC
not a connection
circuit 8
";
        let (connections, circuits) = parse_sample(content);

        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].local_port, 9001);
        assert_eq!(connections[0].remote_addr.to_string(), "10.0.0.5");
        assert_eq!(connections[1].remote_port, 51234);

        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].id, 7);
        assert_eq!(circuits[0].hops, vec!["relayA", "relayB", "relayC"]);
    }

    #[test]
    fn test_memory_source_bumps_revision() {
        let source = MemorySource::default();
        assert_eq!(source.resolution_count(), 0);

        source.set_connections(Vec::new());
        assert_eq!(source.resolution_count(), 1);
        source.set_connections(Vec::new());
        assert_eq!(source.resolution_count(), 2);
    }

    #[test]
    fn test_file_source_revision_follows_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "127.0.0.1:9001 10.0.0.5:443").unwrap();

        let source = FileSource::new(file.path()).unwrap();
        let first = source.resolution_count();
        assert_eq!(source.resolution_count(), first);
        assert_eq!(source.connections().len(), 1);

        writeln!(file, "127.0.0.1:9001 10.0.0.6:443").unwrap();
        assert_eq!(source.resolution_count(), first + 1);
        assert_eq!(source.connections().len(), 2);
    }

    #[test]
    fn test_tuple_display() {
        let tuple = parse_connection_line("127.0.0.1:9001 10.0.0.5:443").unwrap();
        assert_eq!(tuple.to_string(), "127.0.0.1:9001 --> 10.0.0.5:443");
    }
}
