//! Rows of the connection listing.
//!
//! An [`Entry`] is one logical item (a connection, or a circuit with its
//! hops) and is shared by `Arc`, so the entry object reused by
//! reconciliation keeps its first-seen time, cached category and display
//! flags. The renderer and scroller work on [`EntryLine`] handles, one per
//! displayed line.

use crate::clock::format_uptime;
use crate::directory::RelayContext;
use crate::source::{CircuitPath, ConnTuple};
use chrono::{DateTime, Local};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

fn next_entry_id() -> u64 {
    NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Inbound,
    Outbound,
    Exit,
    Socks,
    Circuit,
    Directory,
    Control,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Inbound,
        Category::Outbound,
        Category::Exit,
        Category::Socks,
        Category::Circuit,
        Category::Directory,
        Category::Control,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Inbound => "Inbound",
            Category::Outbound => "Outbound",
            Category::Exit => "Exit",
            Category::Socks => "Socks",
            Category::Circuit => "Circuit",
            Category::Directory => "Directory",
            Category::Control => "Control",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Category::Inbound => Color::Green,
            Category::Outbound => Color::Blue,
            Category::Exit => Color::Red,
            Category::Socks | Category::Circuit => Color::Cyan,
            Category::Directory => Color::Magenta,
            Category::Control => Color::Yellow,
        }
    }

    fn rank(&self) -> u64 {
        *self as u64
    }
}

/// What identifies a connection in the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingMode {
    #[default]
    IpAddress,
    Hostname,
    Fingerprint,
    Nickname,
}

impl ListingMode {
    pub const ALL: [ListingMode; 4] = [
        ListingMode::IpAddress,
        ListingMode::Hostname,
        ListingMode::Fingerprint,
        ListingMode::Nickname,
    ];

    /// Maps a configured index onto a mode, clamping out of range values.
    pub fn from_index_clamped(index: i64) -> Self {
        let max = (Self::ALL.len() - 1) as i64;
        Self::ALL[index.clamp(0, max) as usize]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ListingMode::IpAddress => "IP Address",
            ListingMode::Hostname => "Hostname",
            ListingMode::Fingerprint => "Fingerprint",
            ListingMode::Nickname => "Nickname",
        }
    }

    #[must_use]
    pub fn next(&self) -> Self {
        match self {
            ListingMode::IpAddress => ListingMode::Hostname,
            ListingMode::Hostname => ListingMode::Fingerprint,
            ListingMode::Fingerprint => ListingMode::Nickname,
            ListingMode::Nickname => ListingMode::IpAddress,
        }
    }
}

/// Attributes the listing can be sorted by. Indices into [`SortAttr::ALL`]
/// are what the `Order` config option holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortAttr {
    Category,
    Uptime,
    Listing,
    IpAddress,
    Port,
    Hostname,
    Fingerprint,
    Nickname,
}

impl SortAttr {
    pub const ALL: [SortAttr; 8] = [
        SortAttr::Category,
        SortAttr::Uptime,
        SortAttr::Listing,
        SortAttr::IpAddress,
        SortAttr::Port,
        SortAttr::Hostname,
        SortAttr::Fingerprint,
        SortAttr::Nickname,
    ];

    /// Most attributes a sort ordering may hold.
    pub const MAX_KEYS: usize = 3;

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortAttr::Category => "Category",
            SortAttr::Uptime => "Uptime",
            SortAttr::Listing => "Listing",
            SortAttr::IpAddress => "IP Address",
            SortAttr::Port => "Port",
            SortAttr::Hostname => "Hostname",
            SortAttr::Fingerprint => "Fingerprint",
            SortAttr::Nickname => "Nickname",
        }
    }
}

pub const DEFAULT_SORT_ORDER: [SortAttr; 3] =
    [SortAttr::Category, SortAttr::Listing, SortAttr::Uptime];

/// One component of an entry's composite sort key. Unknown values sort
/// after known ones and circuits after connections.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Int(u64),
    Addr(IpAddr, u16),
    Text(String),
    Missing,
    Circuit(u32),
}

impl SortValue {
    fn text(value: Option<&str>) -> Self {
        value.map_or(SortValue::Missing, |v| SortValue::Text(v.to_lowercase()))
    }
}

/// A live connection held by the relay.
#[derive(Debug)]
pub struct ConnectionEntry {
    id: u64,
    tuple: ConnTuple,
    started: DateTime<Local>,
    category: Mutex<Option<Category>>,
    fresh: AtomicBool,
}

impl ConnectionEntry {
    pub fn new(tuple: ConnTuple, started: DateTime<Local>) -> Self {
        Self {
            id: next_entry_id(),
            tuple,
            started,
            category: Mutex::new(None),
            fresh: AtomicBool::new(true),
        }
    }

    pub fn tuple(&self) -> &ConnTuple {
        &self.tuple
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    /// True until the entry survives its first reconciliation.
    pub fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Relaxed)
    }

    pub fn reset_display(&self) {
        self.fresh.store(false, Ordering::Relaxed);
    }

    /// The cached category, computing it on first use.
    pub fn category(&self, ctx: &RelayContext) -> Category {
        let mut cached = self.category.lock().unwrap_or_else(|e| e.into_inner());
        *cached.get_or_insert_with(|| classify(&self.tuple, ctx))
    }

    pub fn cached_category(&self) -> Option<Category> {
        *self.category.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drops the cached category and classifies again.
    pub fn refresh_category(&self, ctx: &RelayContext) -> Category {
        let category = classify(&self.tuple, ctx);
        *self.category.lock().unwrap_or_else(|e| e.into_inner()) = Some(category);
        category
    }

    fn fingerprint<'a>(&self, ctx: &'a RelayContext) -> Option<&'a str> {
        ctx.directory
            .lookup(self.tuple.remote_addr, self.tuple.remote_port)
            .map(|relay| relay.fingerprint.as_str())
    }

    fn nickname<'a>(&self, ctx: &'a RelayContext) -> Option<&'a str> {
        ctx.directory
            .lookup(self.tuple.remote_addr, self.tuple.remote_port)
            .map(|relay| relay.nickname.as_str())
    }

    fn hostname<'a>(&self, ctx: &'a RelayContext) -> Option<&'a str> {
        ctx.directory.hostname(self.tuple.remote_addr)
    }

    /// How the remote end is shown in the given listing mode.
    pub fn listing_value(&self, mode: ListingMode, ctx: &RelayContext) -> String {
        let remote = self.tuple.remote();
        match mode {
            ListingMode::IpAddress => remote.to_string(),
            ListingMode::Hostname => match self.hostname(ctx) {
                Some(hostname) => format!("{hostname}:{}", remote.port()),
                None => remote.to_string(),
            },
            ListingMode::Fingerprint => self.fingerprint(ctx).unwrap_or("UNKNOWN").to_string(),
            ListingMode::Nickname => self.nickname(ctx).unwrap_or("UNKNOWN").to_string(),
        }
    }

    pub fn sort_value(&self, attr: SortAttr, mode: ListingMode, ctx: &RelayContext) -> SortValue {
        match attr {
            SortAttr::Category => SortValue::Int(self.category(ctx).rank()),
            SortAttr::Uptime => SortValue::Int(self.started.timestamp_micros().max(0) as u64),
            SortAttr::Listing => match mode {
                ListingMode::IpAddress => self.sort_value(SortAttr::IpAddress, mode, ctx),
                ListingMode::Hostname => self.sort_value(SortAttr::Hostname, mode, ctx),
                ListingMode::Fingerprint => self.sort_value(SortAttr::Fingerprint, mode, ctx),
                ListingMode::Nickname => self.sort_value(SortAttr::Nickname, mode, ctx),
            },
            SortAttr::IpAddress => SortValue::Addr(self.tuple.remote_addr, self.tuple.remote_port),
            SortAttr::Port => SortValue::Int(u64::from(self.tuple.remote_port)),
            SortAttr::Hostname => SortValue::text(self.hostname(ctx)),
            SortAttr::Fingerprint => SortValue::text(self.fingerprint(ctx)),
            SortAttr::Nickname => SortValue::text(self.nickname(ctx)),
        }
    }

    fn listing_row(
        &self,
        width: usize,
        reference_time: DateTime<Local>,
        mode: ListingMode,
        ctx: &RelayContext,
    ) -> Line<'static> {
        let category = self.category(ctx);
        let left = format!(
            "{}  -->  {}",
            self.tuple.local(),
            self.listing_value(mode, ctx)
        );
        let right = format!(
            "{:>5} ({})",
            format_uptime(reference_time - self.started),
            category.name().to_uppercase()
        );

        let mut style = Style::default().fg(category.color());
        if self.is_fresh() {
            style = style.add_modifier(Modifier::BOLD);
        }

        Line::from(Span::styled(justify(&left, &right, width), style))
    }

    fn details(&self, width: usize, ctx: &RelayContext) -> Vec<Line<'static>> {
        let remote = self.tuple.remote();
        let relay = ctx.directory.lookup(remote.ip(), remote.port());
        let label = Style::default().add_modifier(Modifier::BOLD);
        let category = self.category(ctx);

        let mut rows = vec![
            detail_row("address: ", &remote.to_string(), label, width),
            detail_row("local: ", &self.tuple.local().to_string(), label, width),
            detail_row("category: ", category.name(), label, width),
            detail_row(
                "connected: ",
                &self.started.format("%Y-%m-%d %H:%M:%S").to_string(),
                label,
                width,
            ),
        ];

        if let Some(hostname) = self.hostname(ctx) {
            rows.push(detail_row("hostname: ", hostname, label, width));
        }

        match relay {
            Some(relay) => {
                rows.push(detail_row("fingerprint: ", &relay.fingerprint, label, width));
                rows.push(detail_row("nickname: ", &relay.nickname, label, width));
                rows.push(detail_row(
                    "or port: ",
                    &relay.or_port.to_string(),
                    label,
                    width,
                ));
            }
            None => rows.push(detail_row("fingerprint: ", "UNKNOWN", label, width)),
        }

        rows
    }
}

/// Classifies a connection by the local port it uses and by whether the
/// remote end is a known relay.
pub fn classify(tuple: &ConnTuple, ctx: &RelayContext) -> Category {
    let local = &ctx.local;
    let port = Some(tuple.local_port);

    if port == local.or_port {
        Category::Inbound
    } else if port == local.dir_port {
        Category::Directory
    } else if port == local.control_port {
        Category::Control
    } else if port == local.socks_port {
        Category::Socks
    } else if ctx.directory.is_relay(tuple.remote_addr, tuple.remote_port) {
        Category::Outbound
    } else if local.is_exit {
        Category::Exit
    } else {
        Category::Outbound
    }
}

/// A circuit and its hops; displayed as a header line plus one line per hop.
#[derive(Debug)]
pub struct CircuitEntry {
    id: u64,
    circuit: CircuitPath,
}

impl CircuitEntry {
    pub fn new(circuit: CircuitPath) -> Self {
        Self {
            id: next_entry_id(),
            circuit,
        }
    }

    pub fn circuit(&self) -> &CircuitPath {
        &self.circuit
    }

    fn line_count(&self) -> usize {
        1 + self.circuit.hops.len()
    }

    fn listing_row(&self, index: usize, width: usize) -> Line<'static> {
        let style = Style::default().fg(Category::Circuit.color());
        let hops = &self.circuit.hops;

        let text = if index == 0 {
            let right = format!("{} hops (CIRCUIT)", hops.len());
            justify(&format!("Circuit {}", self.circuit.id), &right, width)
        } else {
            let glyph = if index == hops.len() { '└' } else { '├' };
            let hop = hops.get(index - 1).map(String::as_str).unwrap_or("");
            truncate(&format!(" {glyph} {index}. {hop}"), width)
        };

        Line::from(Span::styled(text, style))
    }

    fn details(&self, width: usize) -> Vec<Line<'static>> {
        let label = Style::default().add_modifier(Modifier::BOLD);
        let mut rows = vec![
            detail_row("circuit: ", &self.circuit.id.to_string(), label, width),
            detail_row("path: ", &self.circuit.hops.join(" -> "), label, width),
        ];
        for (i, hop) in self.circuit.hops.iter().enumerate() {
            rows.push(detail_row(&format!("hop {}: ", i + 1), hop, label, width));
        }
        rows
    }
}

#[derive(Debug, Clone)]
pub enum Entry {
    Connection(Arc<ConnectionEntry>),
    Circuit(Arc<CircuitEntry>),
}

impl Entry {
    pub fn connection(tuple: ConnTuple, started: DateTime<Local>) -> Self {
        Entry::Connection(Arc::new(ConnectionEntry::new(tuple, started)))
    }

    pub fn circuit(circuit: CircuitPath) -> Self {
        Entry::Circuit(Arc::new(CircuitEntry::new(circuit)))
    }

    pub fn id(&self) -> u64 {
        match self {
            Entry::Connection(conn) => conn.id,
            Entry::Circuit(circ) => circ.id,
        }
    }

    pub fn as_connection(&self) -> Option<&Arc<ConnectionEntry>> {
        match self {
            Entry::Connection(conn) => Some(conn),
            Entry::Circuit(_) => None,
        }
    }

    /// Whether both handles point at the same entry object.
    pub fn ptr_eq(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Connection(a), Entry::Connection(b)) => Arc::ptr_eq(a, b),
            (Entry::Circuit(a), Entry::Circuit(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn lines(&self) -> Vec<EntryLine> {
        let count = match self {
            Entry::Connection(_) => 1,
            Entry::Circuit(circ) => circ.line_count(),
        };

        (0..count)
            .map(|index| EntryLine {
                entry: self.clone(),
                index,
            })
            .collect()
    }

    pub fn category(&self, ctx: &RelayContext) -> Category {
        match self {
            Entry::Connection(conn) => conn.category(ctx),
            Entry::Circuit(_) => Category::Circuit,
        }
    }

    pub fn reset_display(&self) {
        if let Entry::Connection(conn) = self {
            conn.reset_display();
        }
    }

    pub fn sort_values(
        &self,
        keys: &[SortAttr],
        mode: ListingMode,
        ctx: &RelayContext,
    ) -> Vec<SortValue> {
        keys.iter()
            .map(|&attr| match self {
                Entry::Connection(conn) => conn.sort_value(attr, mode, ctx),
                Entry::Circuit(_) if attr == SortAttr::Category => {
                    SortValue::Int(Category::Circuit.rank())
                }
                Entry::Circuit(circ) => SortValue::Circuit(circ.circuit.id),
            })
            .collect()
    }
}

/// Handle on one displayed line of an entry. Two handles are equal when
/// they refer to the same line of the same entry object.
#[derive(Debug, Clone)]
pub struct EntryLine {
    entry: Entry,
    index: usize,
}

impl PartialEq for EntryLine {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.entry.id() == other.entry.id()
    }
}

impl Eq for EntryLine {}

impl EntryLine {
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn category(&self, ctx: &RelayContext) -> Category {
        self.entry.category(ctx)
    }

    pub fn sort_values(
        &self,
        keys: &[SortAttr],
        mode: ListingMode,
        ctx: &RelayContext,
    ) -> Vec<SortValue> {
        self.entry.sort_values(keys, mode, ctx)
    }

    pub fn reset_display(&self) {
        self.entry.reset_display();
    }

    /// The row drawn in the listing. Durations are measured against
    /// `reference_time`, which is frozen while the panel is paused.
    pub fn listing_row(
        &self,
        width: usize,
        reference_time: DateTime<Local>,
        mode: ListingMode,
        ctx: &RelayContext,
    ) -> Line<'static> {
        match &self.entry {
            Entry::Connection(conn) => conn.listing_row(width, reference_time, mode, ctx),
            Entry::Circuit(circ) => circ.listing_row(self.index, width),
        }
    }

    /// Rows for the details block. Callers draw as many as fit.
    pub fn details(&self, width: usize, ctx: &RelayContext) -> Vec<Line<'static>> {
        match &self.entry {
            Entry::Connection(conn) => conn.details(width, ctx),
            Entry::Circuit(circ) => circ.details(width),
        }
    }
}

fn detail_row(label: &str, value: &str, label_style: Style, width: usize) -> Line<'static> {
    let value_width = width.saturating_sub(label.chars().count());
    Line::from(vec![
        Span::styled(truncate(label, width), label_style),
        Span::raw(truncate(value, value_width)),
    ])
}

/// Places `right` at the end of a `width` wide row, cutting `left` short
/// when both do not fit.
fn justify(left: &str, right: &str, width: usize) -> String {
    let right_len = right.chars().count();
    if right_len + 1 >= width {
        return truncate(left, width);
    }

    let left = truncate(left, width - right_len - 1);
    let padding = width - right_len - left.chars().count();
    format!("{left}{}{right}", " ".repeat(padding))
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}
