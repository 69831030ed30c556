//! Wall-clock access for the panel.
//!
//! Uptime labels and the polling schedule both read time through [`Clock`],
//! so a paused panel can freeze its reference time and tests can step time
//! by hand.

use chrono::{DateTime, Duration, Local};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Formats an elapsed duration the way the listing shows uptime: the
/// largest whole unit only ("45s", "12m", "3h", "2d").
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);

    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::default();
        let start = clock.now();

        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(10));
        assert_eq!(clock.now() - start, Duration::seconds(10));
    }

    #[test]
    fn test_format_uptime_units() {
        assert_eq!(format_uptime(Duration::seconds(0)), "0s");
        assert_eq!(format_uptime(Duration::seconds(59)), "59s");
        assert_eq!(format_uptime(Duration::seconds(61)), "1m");
        assert_eq!(format_uptime(Duration::seconds(7200)), "2h");
        assert_eq!(format_uptime(Duration::days(3)), "3d");
        assert_eq!(format_uptime(Duration::seconds(-5)), "0s");
    }
}
