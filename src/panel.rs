//! The live connection panel.
//!
//! All mutable state lives in one [`PanelState`] behind one mutex. The
//! updater thread polls the connection source on a fixed schedule, the
//! input path moves the cursor and changes the ordering, and drawing reads
//! the state, each while holding that same lock. The updater waits on a
//! condition variable with a short timeout so pausing and halting are
//! noticed promptly.

use crate::clock::Clock;
use crate::config::PanelSettings;
use crate::directory::{RelayContext, RelayDirectory};
use crate::entries::{Entry, EntryLine, ListingMode, SortAttr};
use crate::error::Result;
use crate::input::InputEvent;
use crate::listing::{self, BARE_TITLE};
use crate::scroller::Scroller;
use crate::source::ConnectionSource;
use chrono::{DateTime, Local};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Rows of the details block, not counting its borders.
pub const DETAILS_HEIGHT: usize = 7;

/// Title shown in place of the counts while the details block is open.
pub const DETAILS_TITLE: &str = "Connection Details:";

/// Columns taken by the scrollbar, including its gap.
const SCROLLBAR_WIDTH: u16 = 3;

/// Upper bound on how long the updater sleeps before rechecking its state.
const WAIT_TIMEOUT: Duration = Duration::from_millis(200);

const POISONED: &str = "connection panel state lock poisoned";

/// Asks the front-end for a redraw. Requests made while one is already
/// pending are merged into it.
#[derive(Debug, Clone)]
pub struct RedrawSignal(SyncSender<()>);

impl RedrawSignal {
    pub fn request(&self) {
        let _ = self.0.try_send(());
    }
}

pub fn redraw_channel() -> (RedrawSignal, Receiver<()>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (RedrawSignal(tx), rx)
}

struct PanelState {
    entries: Vec<Entry>,
    lines: Vec<EntryLine>,
    title: String,
    last_revision: Option<u64>,
    sort_order: Vec<SortAttr>,
    listing_mode: ListingMode,
    paused: bool,
    pause_time: Option<DateTime<Local>>,
    scroller: Scroller<EntryLine>,
    show_details: bool,
    halt: bool,
    height: usize,
    last_poll: DateTime<Local>,
    context: RelayContext,
}

impl PanelState {
    fn resort(&mut self) {
        listing::sort_entries(
            &mut self.entries,
            &self.sort_order,
            self.listing_mode,
            &self.context,
        );
        self.lines = listing::flatten_lines(&self.entries);
    }

    fn set_listing_mode(&mut self, mode: ListingMode) -> bool {
        if self.listing_mode == mode {
            return false;
        }

        self.listing_mode = mode;
        if self.sort_order.contains(&SortAttr::Listing) {
            self.resort();
            true
        } else {
            false
        }
    }

    fn details_offset(&self) -> usize {
        if self.show_details {
            DETAILS_HEIGHT + 1
        } else {
            0
        }
    }

    /// Rows available to the listing below the title (and details).
    fn page_height(&self) -> usize {
        self.height
            .saturating_sub(1)
            .saturating_sub(self.details_offset())
    }
}

struct PanelInner {
    state: Mutex<PanelState>,
    wake: Condvar,
    source: Arc<dyn ConnectionSource>,
    clock: Arc<dyn Clock>,
    refresh_rate: chrono::Duration,
    redraw: RedrawSignal,
}

impl PanelInner {
    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().expect(POISONED)
    }

    /// Reconciles against the source when its revision moved. The source is
    /// read outside the lock so a slow resolution never stalls drawing.
    fn update(&self) -> bool {
        self.reconcile_source(false)
    }

    /// The updater's poll. Unlike [`PanelInner::update`] it backs off when a
    /// pause landed after the poll was scheduled.
    fn poll(&self) -> bool {
        self.reconcile_source(true)
    }

    fn reconcile_source(&self, skip_if_paused: bool) -> bool {
        let revision = self.source.resolution_count();
        {
            let state = self.lock();
            if state.last_revision == Some(revision) || (skip_if_paused && state.paused) {
                return false;
            }
        }

        let sample = self.source.connections();
        let circuits = self.source.circuits();
        let now = self.clock.now();

        let mut state = self.lock();
        if state.last_revision == Some(revision) || (skip_if_paused && state.paused) {
            return false;
        }

        let mut entries = listing::reconcile(&state.entries, &sample, now);
        entries.extend(circuits.into_iter().map(Entry::circuit));
        state.entries = entries;
        state.last_revision = Some(revision);

        // refreshes the category caches the sort reads
        state.title = listing::derive_title(&state.entries, &state.context);
        state.resort();

        log::trace!("Revision {revision}: {}", state.title);
        true
    }

    fn set_paused(&self, state: &mut PanelState, paused: bool) {
        if state.paused == paused {
            return;
        }

        state.paused = paused;
        state.pause_time = paused.then(|| self.clock.now());
        log::debug!("Connection panel {}", if paused { "paused" } else { "resumed" });

        self.wake.notify_all();
        self.redraw.request();
    }

    fn reference_time(&self, state: &PanelState) -> DateTime<Local> {
        state.pause_time.unwrap_or_else(|| self.clock.now())
    }
}

/// When the poll after `last` is due. Polls follow a fixed schedule, but a
/// schedule that fell a whole interval or more behind (after a pause, or a
/// stalled source) restarts from `now` rather than firing the missed polls
/// back to back.
pub fn next_poll(
    last: DateTime<Local>,
    now: DateTime<Local>,
    refresh_rate: chrono::Duration,
) -> DateTime<Local> {
    let next = last + refresh_rate;
    if now - next >= refresh_rate {
        now
    } else {
        next
    }
}

/// Advances the primary sort key to the next attribute, keeping the
/// secondary keys that differ from it.
pub fn cycle_primary_key(order: &[SortAttr]) -> Vec<SortAttr> {
    let current = order.first().copied().unwrap_or(SortAttr::Category);
    let position = SortAttr::ALL
        .iter()
        .position(|attr| *attr == current)
        .unwrap_or(0);
    let primary = SortAttr::ALL[(position + 1) % SortAttr::ALL.len()];

    std::iter::once(primary)
        .chain(order.iter().skip(1).copied().filter(|attr| *attr != primary))
        .collect()
}

fn run(inner: Arc<PanelInner>) {
    log::debug!("Connection panel updater started");
    let mut state = inner.lock();

    loop {
        if state.halt {
            break;
        }

        let now = inner.clock.now();
        if state.paused || now - state.last_poll < inner.refresh_rate {
            state = match inner.wake.wait_timeout(state, WAIT_TIMEOUT) {
                Ok((guard, _)) => guard,
                Err(_) => panic!("{POISONED}"),
            };
            continue;
        }

        state.last_poll = next_poll(state.last_poll, now, inner.refresh_rate);
        drop(state);

        inner.poll();
        inner.redraw.request();

        state = inner.lock();
    }

    log::debug!("Connection panel updater stopped");
}

/// Listing of the relay's connections, kept current by a background
/// updater once [`ConnectionPanel::start`] is called.
pub struct ConnectionPanel {
    inner: Arc<PanelInner>,
    updater: Option<JoinHandle<()>>,
}

impl ConnectionPanel {
    /// Builds the panel and runs the first reconciliation, so the listing
    /// is populated before anything is drawn.
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        clock: Arc<dyn Clock>,
        context: RelayContext,
        settings: &PanelSettings,
        redraw: RedrawSignal,
    ) -> Self {
        let refresh_rate = chrono::Duration::from_std(settings.refresh_rate)
            .unwrap_or_else(|_| chrono::Duration::seconds(1));

        let state = PanelState {
            entries: Vec::new(),
            lines: Vec::new(),
            title: BARE_TITLE.to_string(),
            last_revision: None,
            sort_order: settings.sort_order.clone(),
            listing_mode: settings.listing_mode,
            paused: false,
            pause_time: None,
            scroller: Scroller::new(true),
            show_details: false,
            halt: false,
            height: 0,
            last_poll: clock.now(),
            context,
        };

        let inner = Arc::new(PanelInner {
            state: Mutex::new(state),
            wake: Condvar::new(),
            source,
            clock,
            refresh_rate,
            redraw,
        });
        inner.update();

        Self {
            inner,
            updater: None,
        }
    }

    /// Spawns the updater thread. Calling it again is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.updater.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("connection-panel".to_string())
            .spawn(move || run(inner))?;
        self.updater = Some(handle);
        Ok(())
    }

    /// Whether the updater thread is alive.
    pub fn is_running(&self) -> bool {
        self.updater
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Fetches the newest connections, returning whether the listing was
    /// rebuilt. Nothing happens while the source's revision is unchanged.
    pub fn update(&self) -> bool {
        self.inner.update()
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.inner.lock();
        self.inner.set_paused(&mut state, paused);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Replaces the sort keys, or re-sorts with the current ones when
    /// `order` is `None`. The keys are expected to be validated already.
    pub fn set_sort_order(&self, order: Option<Vec<SortAttr>>) {
        let mut state = self.inner.lock();
        if let Some(order) = order {
            state.sort_order = order;
        }
        state.resort();
        self.inner.redraw.request();
    }

    pub fn sort_order(&self) -> Vec<SortAttr> {
        self.inner.lock().sort_order.clone()
    }

    /// Changes what identifies each connection. Returns whether the
    /// listing was re-sorted, which only happens when the listing value is
    /// one of the sort keys.
    pub fn set_listing_type(&self, mode: ListingMode) -> bool {
        let resorted = self.inner.lock().set_listing_mode(mode);
        self.inner.redraw.request();
        resorted
    }

    pub fn listing_type(&self) -> ListingMode {
        self.inner.lock().listing_mode
    }

    /// Handles a key meant for the panel. Returns false for keys the panel
    /// does not use.
    pub fn handle_key(&self, event: InputEvent) -> bool {
        let mut state = self.inner.lock();

        match event {
            InputEvent::Scroll(key) => {
                let page_height = state.page_height();
                let PanelState { scroller, lines, .. } = &mut *state;
                if scroller.handle_key(key, lines, page_height) {
                    self.inner.redraw.request();
                }
            }
            InputEvent::ToggleDetails => {
                state.show_details = !state.show_details;
                self.inner.redraw.request();
            }
            InputEvent::NextListing => {
                let next = state.listing_mode.next();
                state.set_listing_mode(next);
                self.inner.redraw.request();
            }
            InputEvent::CycleSort => {
                state.sort_order = cycle_primary_key(&state.sort_order);
                state.resort();
                self.inner.redraw.request();
            }
            InputEvent::Pause => {
                let paused = !state.paused;
                self.inner.set_paused(&mut state, paused);
            }
            InputEvent::Help | InputEvent::Quit | InputEvent::Unknown => return false,
        }

        true
    }

    /// Halts the updater. It exits within one wait timeout.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.halt = true;
        self.inner.wake.notify_all();
    }

    /// Swaps in a new relay directory, re-classifying every connection.
    pub fn update_directory(&self, directory: RelayDirectory) {
        let mut state = self.inner.lock();
        state.context.directory = directory;
        state.title = listing::derive_title(&state.entries, &state.context);
        state.resort();
        self.inner.redraw.request();
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.inner.lock().entries.clone()
    }

    pub fn title(&self) -> String {
        self.inner.lock().title.clone()
    }

    pub fn show_details(&self) -> bool {
        self.inner.lock().show_details
    }

    /// The line under the cursor.
    pub fn selection(&self) -> Option<EntryLine> {
        let mut state = self.inner.lock();
        let PanelState { scroller, lines, .. } = &mut *state;
        let selection = scroller.cursor_selection(lines);
        selection
    }

    /// The listing rows as they would be drawn `width` columns wide.
    pub fn listing_rows(&self, width: usize) -> Vec<Line<'static>> {
        let state = self.inner.lock();
        let reference_time = self.inner.reference_time(&state);
        let rows = state
            .lines
            .iter()
            .map(|line| line.listing_row(width, reference_time, state.listing_mode, &state.context))
            .collect();
        rows
    }

    /// Title and listing as plain text, one row per line.
    pub fn snapshot(&self, width: usize) -> String {
        let title = self.title();
        std::iter::once(title)
            .chain(self.listing_rows(width).iter().map(line_text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Draws the panel into `area`.
    pub fn draw(&self, f: &mut Frame, area: Rect) {
        let mut state = self.inner.lock();
        let reference_time = self.inner.reference_time(&state);
        draw_panel(f, area, &mut state, reference_time);
    }
}

impl Drop for ConnectionPanel {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.updater.take() {
            let _ = handle.join();
        }
    }
}

fn line_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|span| span.content.as_ref()).collect()
}

fn draw_panel(f: &mut Frame, area: Rect, state: &mut PanelState, reference_time: DateTime<Local>) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    state.height = area.height as usize;
    let details_offset = state.details_offset();
    let page_height = state.page_height();
    let scrollbar_visible = state.lines.len() > page_height;

    let PanelState {
        lines,
        scroller,
        context,
        listing_mode,
        show_details,
        title,
        ..
    } = state;
    let scroll_loc = scroller.scroll_loc(lines, page_height);
    let selection = scroller.cursor_selection(lines);

    if *show_details {
        let box_height = (DETAILS_HEIGHT as u16 + 2).min(area.height);
        let details_area = Rect::new(area.x, area.y, area.width, box_height);
        f.render_widget(Block::default().borders(Borders::ALL), details_area);

        if let Some(selected) = &selection {
            let inner_width = area.width.saturating_sub(3);
            let rows = selected.details(inner_width as usize, context);
            for (i, row) in rows.into_iter().take(DETAILS_HEIGHT).enumerate() {
                let y = area.y + 1 + i as u16;
                if y + 1 >= area.y + box_height {
                    break;
                }
                f.render_widget(
                    Paragraph::new(row),
                    Rect::new(area.x + 2, y, inner_width, 1),
                );
            }
        }
    }

    let title_text = if *show_details {
        DETAILS_TITLE
    } else {
        title.as_str()
    };
    let title_width = (Line::from(title_text).width() as u16).min(area.width);
    f.render_widget(
        Paragraph::new(title_text).style(Style::default().add_modifier(Modifier::REVERSED)),
        Rect::new(area.x, area.y, title_width, 1),
    );

    let list_y = area.y + 1 + details_offset as u16;
    if page_height == 0 || list_y >= area.y + area.height {
        return;
    }

    let offset = if scrollbar_visible {
        SCROLLBAR_WIDTH.min(area.width)
    } else {
        0
    };

    if scrollbar_visible {
        let mut scrollbar_state = ScrollbarState::new(lines.len())
            .position(scroll_loc)
            .viewport_content_length(page_height);
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalLeft)
                .begin_symbol(None)
                .end_symbol(None),
            Rect::new(area.x, list_y, 1, page_height as u16),
            &mut scrollbar_state,
        );
    }

    let row_width = area.width - offset;
    for (i, line) in lines.iter().skip(scroll_loc).take(page_height).enumerate() {
        let mut row = line.listing_row(row_width as usize, reference_time, *listing_mode, context);
        if selection.as_ref() == Some(line) {
            row = row.patch_style(Style::default().add_modifier(Modifier::REVERSED));
        }

        f.render_widget(
            Paragraph::new(row),
            Rect::new(area.x + offset, list_y + i as u16, row_width, 1),
        );
    }
}
