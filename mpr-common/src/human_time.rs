//! Clock-style formatting and parsing of playback positions
//!
//! Positions are shown as `M:SS` below one hour and `H:MM:SS` above it,
//! the way the terminal front end prints elapsed/total time.

use crate::{Error, Result};
use std::time::Duration;

const SECONDS_PER_HOUR: u64 = 3600;

/// Format a position as `M:SS` (or `H:MM:SS` from one hour on).
///
/// Fractions of a second are truncated.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mpr_common::human_time::format_clock;
///
/// assert_eq!(format_clock(Duration::from_secs(0)), "0:00");
/// assert_eq!(format_clock(Duration::from_secs(75)), "1:15");
/// assert_eq!(format_clock(Duration::from_secs(3661)), "1:01:01");
/// ```
pub fn format_clock(position: Duration) -> String {
    let total = position.as_secs();
    let hours = total / SECONDS_PER_HOUR;
    let mins = (total % SECONDS_PER_HOUR) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Format `elapsed / total`, or just the elapsed clock when the total is unknown
/// (radio streams).
pub fn format_progress(elapsed: Duration, total: Option<Duration>) -> String {
    match total {
        Some(total) => format!("{} / {}", format_clock(elapsed), format_clock(total)),
        None => format_clock(elapsed),
    }
}

/// Parse a position typed by a user: plain seconds (`"90"`, `"12.5"`),
/// `M:SS` or `H:MM:SS`.
pub fn parse_clock(text: &str) -> Result<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("empty time value".to_string()));
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return Err(Error::InvalidInput(format!("invalid time value: {}", text)));
    }

    let mut seconds = 0.0;
    for (idx, part) in parts.iter().enumerate() {
        let value: f64 = part
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid time value: {}", text)))?;
        if !value.is_finite() {
            return Err(Error::InvalidInput(format!("invalid time value: {}", text)));
        }
        if value < 0.0 {
            return Err(Error::InvalidInput(format!("negative time value: {}", text)));
        }
        // Only the last field may carry a fraction; minutes/seconds fields stay below 60
        if idx + 1 < parts.len() && value.fract() != 0.0 {
            return Err(Error::InvalidInput(format!("fraction before last field: {}", text)));
        }
        if idx > 0 && value >= 60.0 {
            return Err(Error::InvalidInput(format!("field out of range: {}", text)));
        }
        seconds = seconds * 60.0 + value;
    }

    Ok(seconds)
}
