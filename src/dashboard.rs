use crate::{input::InputEvent, panel::ConnectionPanel};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

/// How long to wait for a key before checking for redraw requests.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// Uptime labels change every second even when the listing does not.
const CLOCK_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct DashboardState {
    pub show_help: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Redraw,
    Quit,
}

/// Runs the interactive front-end until the user quits. The panel's
/// updater thread keeps running alongside and asks for redraws through
/// `redraw`.
pub fn run_dashboard<B: Backend>(
    terminal: &mut Terminal<B>,
    panel: &ConnectionPanel,
    redraw: &Receiver<()>,
) -> Result<()> {
    let mut state = DashboardState::default();
    let mut needs_redraw = true;
    let mut last_draw = Instant::now();

    loop {
        if redraw.try_recv().is_ok() {
            needs_redraw = true;
        }

        if !panel.is_paused() && last_draw.elapsed() >= CLOCK_TICK {
            needs_redraw = true;
        }

        if needs_redraw {
            terminal.draw(|f| draw_dashboard(f, panel, &state))?;
            last_draw = Instant::now();
            needs_redraw = false;
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                let input = InputEvent::from_key_event(key);
                log::trace!("Key: {:?}, Modifiers: {:?}, Event: {:?}", key.code, key.modifiers, input);

                match handle_input(&mut state, panel, input) {
                    Control::Quit => break,
                    Control::Redraw => needs_redraw = true,
                    Control::Continue => {}
                }
            }
            Event::Resize(_, _) => needs_redraw = true,
            _ => {}
        }
    }

    Ok(())
}

/// Routes a key to the help overlay or to the panel.
pub fn handle_input(
    state: &mut DashboardState,
    panel: &ConnectionPanel,
    input: InputEvent,
) -> Control {
    match input {
        InputEvent::Quit => Control::Quit,
        InputEvent::Help => {
            state.show_help = !state.show_help;
            Control::Redraw
        }
        InputEvent::Unknown => Control::Continue,
        _ if state.show_help => {
            // any other key closes the overlay
            state.show_help = false;
            Control::Redraw
        }
        _ => {
            if panel.handle_key(input) {
                Control::Redraw
            } else {
                Control::Continue
            }
        }
    }
}

pub fn draw_dashboard(f: &mut Frame, panel: &ConnectionPanel, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(f.area());

    panel.draw(f, chunks[0]);
    draw_footer(f, chunks[1], panel);

    if state.show_help {
        draw_help_overlay(f);
    }
}

fn draw_footer(f: &mut Frame, area: Rect, panel: &ConnectionPanel) {
    let order = panel
        .sort_order()
        .iter()
        .map(|attr| attr.label())
        .collect::<Vec<_>>()
        .join(", ");

    let mut spans = Vec::new();
    if panel.is_paused() {
        spans.push(Span::styled(
            "PAUSED ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    spans.push(Span::raw(format!(
        "Enter: Details | l: Listing ({}) | s: Sort ({order}) | p: Pause | ?: Help | q: Quit",
        panel.listing_type().label()
    )));

    let footer = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Cyan));

    f.render_widget(footer, area);
}

fn draw_help_overlay(f: &mut Frame) {
    let area = centered_rect(60, 70, f.area());
    let heading = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);

    let help_text = vec![
        Line::from(vec![Span::styled(
            "connwatch Help",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from(vec![Span::styled("Navigation:", heading)]),
        Line::from("  ↑/↓ or k/j       - Move the selection"),
        Line::from("  PgUp / PgDn      - Move a page"),
        Line::from("  Home / End       - First / last connection"),
        Line::from("  Enter            - Show details of the selection"),
        Line::from(""),
        Line::from(vec![Span::styled("Listing:", heading)]),
        Line::from("  l                - Show address, hostname, fingerprint or nickname"),
        Line::from("  s                - Change the primary sort key"),
        Line::from(""),
        Line::from(vec![Span::styled("Other:", heading)]),
        Line::from("  p / Space        - Pause/Resume polling"),
        Line::from("  ? / F1           - Toggle this help"),
        Line::from("  q / Esc          - Quit connwatch"),
    ];

    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(Color::White));

    f.render_widget(Clear, area);
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PanelSettings;
    use crate::directory::RelayContext;
    use crate::panel::redraw_channel;
    use crate::scroller::ScrollKey;
    use crate::source::{ConnTuple, MemorySource};
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    fn panel() -> ConnectionPanel {
        let source = Arc::new(MemorySource::new(vec![ConnTuple::new(
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:443".parse().unwrap(),
        )]));
        let (redraw, _rx) = redraw_channel();
        ConnectionPanel::new(
            source,
            Arc::new(ManualClock::default()),
            RelayContext::default(),
            &PanelSettings::default(),
            redraw,
        )
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_help_toggles_and_swallows_keys() {
        let panel = panel();
        let mut state = DashboardState::default();

        assert_eq!(handle_input(&mut state, &panel, InputEvent::Help), Control::Redraw);
        assert!(state.show_help);

        // closes the overlay instead of reaching the panel
        assert_eq!(
            handle_input(&mut state, &panel, InputEvent::ToggleDetails),
            Control::Redraw
        );
        assert!(!state.show_help);
        assert!(!panel.show_details());

        assert_eq!(handle_input(&mut state, &panel, InputEvent::Quit), Control::Quit);
        assert_eq!(handle_input(&mut state, &panel, InputEvent::Unknown), Control::Continue);
    }

    #[test]
    fn test_keys_reach_panel() {
        let panel = panel();
        let mut state = DashboardState::default();

        assert_eq!(
            handle_input(&mut state, &panel, InputEvent::ToggleDetails),
            Control::Redraw
        );
        assert!(panel.show_details());

        handle_input(&mut state, &panel, InputEvent::Pause);
        assert!(panel.is_paused());

        assert_eq!(
            handle_input(&mut state, &panel, InputEvent::Scroll(ScrollKey::Down)),
            Control::Redraw
        );
    }

    #[test]
    fn test_draw_dashboard_footer_and_help() {
        let panel = panel();
        let mut state = DashboardState::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();

        terminal
            .draw(|f| draw_dashboard(f, &panel, &state))
            .unwrap();
        let text = screen(&terminal);
        assert!(text.contains("Connections (1 outbound):"));
        assert!(text.contains("l: Listing (IP Address)"));
        assert!(text.contains("s: Sort (Category, Listing, Uptime)"));
        assert!(!text.contains("PAUSED"));

        panel.set_paused(true);
        state.show_help = true;
        terminal
            .draw(|f| draw_dashboard(f, &panel, &state))
            .unwrap();
        let text = screen(&terminal);
        assert!(text.contains("PAUSED"));
        assert!(text.contains("connwatch Help"));
    }
}
