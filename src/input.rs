use crate::scroller::ScrollKey;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    // Navigation
    Scroll(ScrollKey), // arrows, j/k, PgUp/PgDn, Home/End

    // Display
    ToggleDetails, // Enter - details of the selected connection
    NextListing,   // 'l' - cycle ip address / hostname / fingerprint / nickname
    CycleSort,     // 's' - rotate the sort keys
    Help,          // '?' or F1

    // Control
    Pause, // 'p' or Space
    Quit,  // 'q', Esc or Ctrl+C

    Unknown,
}

impl InputEvent {
    pub fn from_key_event(key_event: KeyEvent) -> Self {
        match (key_event.code, key_event.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Self::Quit,

            (KeyCode::Up | KeyCode::Char('k'), _) => Self::Scroll(ScrollKey::Up),
            (KeyCode::Down | KeyCode::Char('j'), _) => Self::Scroll(ScrollKey::Down),
            (KeyCode::PageUp, _) => Self::Scroll(ScrollKey::PageUp),
            (KeyCode::PageDown, _) => Self::Scroll(ScrollKey::PageDown),
            (KeyCode::Home, _) => Self::Scroll(ScrollKey::Home),
            (KeyCode::End, _) => Self::Scroll(ScrollKey::End),

            (KeyCode::Enter, _) => Self::ToggleDetails,
            (KeyCode::Char('l'), _) => Self::NextListing,
            (KeyCode::Char('s'), _) => Self::CycleSort,
            (KeyCode::Char('?') | KeyCode::F(1), _) => Self::Help,

            (KeyCode::Char('p' | ' '), _) => Self::Pause,
            (KeyCode::Char('q') | KeyCode::Esc, _) => Self::Quit,

            _ => Self::Unknown,
        }
    }
}
