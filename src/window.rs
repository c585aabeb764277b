//! Acquisition-time window filtering.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::observation::Observation;

/// Largest day range the FIRMS area API accepts.
pub const MAX_FEED_DAYS: u32 = 10;

/// How far back observations are kept, relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeWindow {
    /// No time restriction.
    #[default]
    All,
    Hours(u32),
}

impl TimeWindow {
    pub const LAST_24H: TimeWindow = TimeWindow::Hours(24);
    pub const LAST_48H: TimeWindow = TimeWindow::Hours(48);
    pub const LAST_72H: TimeWindow = TimeWindow::Hours(72);

    /// Day range to request from the feed so the window is covered.
    ///
    /// Returns `None` for [`TimeWindow::All`]; callers fall back to their
    /// configured default.
    pub fn days(&self) -> Option<u32> {
        match self {
            TimeWindow::All => None,
            TimeWindow::Hours(h) => Some(h.div_ceil(24).clamp(1, MAX_FEED_DAYS)),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::All => write!(f, "all"),
            TimeWindow::Hours(h) => write!(f, "{h}h"),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "all" || s.is_empty() {
            return Ok(TimeWindow::All);
        }

        let digits = s.strip_suffix('h').unwrap_or(&s);
        match digits.parse::<u32>() {
            Ok(0) => Err("time window must be at least 1 hour".to_string()),
            Ok(h) => Ok(TimeWindow::Hours(h)),
            Err(_) => Err(format!(
                "invalid time window '{s}', expected e.g. 24h, 48h, 72h or all"
            )),
        }
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeWindow> for String {
    fn from(window: TimeWindow) -> Self {
        window.to_string()
    }
}

/// Combines a feed date (`YYYY-MM-DD`) and time (`HHMM`, possibly without
/// leading zeros) into a UTC instant.
pub fn acquisition_instant(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;

    let time = time.trim();
    if time.is_empty() || time.len() > 4 || !time.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{time:0>4}");
    let time = NaiveTime::parse_from_str(&padded, "%H%M").ok()?;

    Some(date.and_time(time).and_utc())
}

/// Whether `observation` falls inside `window` ending at `now`.
///
/// Fails open: an observation with a missing or unreadable date or time is
/// always kept. Otherwise it is kept iff acquired at or after
/// `now - window`.
pub fn within_window(observation: &Observation, window: TimeWindow, now: DateTime<Utc>) -> bool {
    let TimeWindow::Hours(hours) = window else {
        return true;
    };

    let (Some(date), Some(time)) = (&observation.acq_date, &observation.acq_time) else {
        return true;
    };

    let Some(acquired) = acquisition_instant(date, time) else {
        return true;
    };

    // A window reaching past the representable range has no lower bound.
    let cutoff =
        Duration::try_hours(i64::from(hours)).and_then(|span| now.checked_sub_signed(span));
    match cutoff {
        Some(cutoff) => acquired >= cutoff,
        None => true,
    }
}
