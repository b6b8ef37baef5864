//! LRC lyrics parsing
//!
//! Supports the common LRC dialect: one or more `[mm:ss.xx]` tags in front
//! of each lyric line, an optional `[offset:±ms]` header, and ID tags
//! (`[ar:]`, `[ti:]`, ...) which are skipped.

use crate::Result;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One timed lyric line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    /// Position in the track where the line starts
    pub timestamp: Duration,
    pub text: String,
}

/// Parse LRC text into lines sorted by timestamp.
///
/// A positive `offset` makes lyrics appear earlier; shifted timestamps
/// saturate at zero. Lines without a time tag are ignored.
pub fn parse_lrc(text: &str) -> Vec<LyricLine> {
    let mut offset_ms: i64 = 0;
    let mut timed: Vec<(i64, String)> = Vec::new();

    for raw_line in text.lines() {
        let mut rest = raw_line.trim();
        let mut stamps = Vec::new();

        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(close) = stripped.find(']') else {
                break;
            };
            let tag = &stripped[..close];
            rest = &stripped[close + 1..];

            if let Some(ms) = parse_time_tag(tag) {
                stamps.push(ms);
            } else if let Some(value) = tag.strip_prefix("offset:") {
                match value.trim().parse::<i64>() {
                    Ok(ms) => offset_ms = ms,
                    Err(_) => debug!("Ignoring malformed LRC offset: {}", value),
                }
            }
        }

        let lyric = rest.trim().to_string();
        for ms in stamps {
            timed.push((ms, lyric.clone()));
        }
    }

    // Stable sort keeps file order for identical stamps
    timed.sort_by_key(|(ms, _)| *ms);

    timed
        .into_iter()
        .map(|(ms, text)| LyricLine {
            timestamp: Duration::from_millis((ms - offset_ms).max(0) as u64),
            text,
        })
        .collect()
}

/// Read and parse an LRC file
pub fn load_lrc<P: AsRef<Path>>(path: P) -> Result<Vec<LyricLine>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let lines = parse_lrc(&text);
    debug!("Loaded {} lyric lines from {}", lines.len(), path.as_ref().display());
    Ok(lines)
}

/// Index of the line being sung at `position`, if any has started yet
pub fn line_at(lines: &[LyricLine], position: Duration) -> Option<usize> {
    let started = lines.partition_point(|line| line.timestamp <= position);
    started.checked_sub(1)
}

/// Parse `mm:ss`, `mm:ss.xx` or `mm:ss:xx` into milliseconds
fn parse_time_tag(tag: &str) -> Option<i64> {
    let (minutes, rest) = tag.split_once(':')?;
    let minutes: i64 = minutes.trim().parse().ok()?;

    // Some editors write centiseconds after a second colon
    let rest = rest.replacen(':', ".", 1);
    let seconds: f64 = rest.trim().parse().ok()?;
    if !(0.0..60.0).contains(&seconds) || minutes < 0 {
        return None;
    }

    Some(minutes * 60_000 + (seconds * 1000.0).round() as i64)
}
