//! Positioning: sample-accurate seeking and position reporting
//!
//! Every operation runs under the session's position lock. Seeks also hold
//! the decode loop and wait for its in-flight buffer before touching the
//! backend, so no seek is ever issued while a decode-to-output write is in
//! progress.

use crate::backend::Whence;
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::session::MediaSession;
use mpr_common::LyricLine;
use std::time::Duration;
use tracing::debug;

/// Seek destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    Samples(i64),
    Seconds(f64),
}

fn require_open(session: &MediaSession) -> Result<()> {
    if session.is_open() {
        Ok(())
    } else {
        Err(Error::SessionNotOpen)
    }
}

fn require_seekable(session: &MediaSession) -> Result<()> {
    require_open(session)?;
    if session.is_radio_station() {
        return Err(Error::Positioning("live radio streams cannot seek".to_string()));
    }
    Ok(())
}

/// Format used to convert between samples and time: the negotiated one,
/// else whatever the decoder reports
fn timing_format(session: &MediaSession) -> Result<FormatDescriptor> {
    let format = match session.current_format() {
        Some(format) => format,
        None => session
            .backend()
            .get_format()
            .map_err(|e| Error::Positioning(format!("sample rate unknown: {}", e)))?,
    };
    if format.rate <= 0 {
        return Err(Error::Positioning(format!("invalid sample rate {}", format.rate)));
    }
    Ok(format)
}

/// Current decode offset in samples
pub fn current_duration(session: &MediaSession) -> Result<i64> {
    require_open(session)?;
    let _lock = session.transport().position_lock();
    session
        .backend()
        .tell()
        .map_err(|e| Error::Positioning(e.to_string()))
}

/// Current decode offset as time
pub fn current_duration_span(session: &MediaSession) -> Result<Duration> {
    let samples = current_duration(session)?;
    Ok(timing_format(session)?.samples_to_duration(samples))
}

/// Total length in samples when the backend knows it (never for radio)
pub fn total_length(session: &MediaSession) -> Result<Option<i64>> {
    require_open(session)?;
    let _lock = session.transport().position_lock();
    Ok(session.backend().length())
}

/// Total length as time
pub fn total_length_span(session: &MediaSession) -> Result<Option<Duration>> {
    match total_length(session)? {
        Some(samples) => Ok(Some(timing_format(session)?.samples_to_duration(samples))),
        None => Ok(None),
    }
}

/// Seek to an absolute position; returns the new offset in samples
pub fn seek_to(session: &MediaSession, target: SeekTarget) -> Result<i64> {
    require_seekable(session)?;
    let samples = match target {
        SeekTarget::Samples(samples) => samples.max(0),
        SeekTarget::Seconds(seconds) => timing_format(session)?.seconds_to_samples(seconds),
    };

    let transport = session.transport();
    let _lock = transport.position_lock();
    let _hold = transport.hold();

    if session.is_output_open() {
        session.backend().drop_buffered_output();
    }
    let offset = session
        .backend()
        .seek(samples, Whence::Set)
        .map_err(|e| Error::Positioning(format!("seek to sample {} failed: {}", samples, e)))?;
    debug!("Seeked to sample {}", offset);
    Ok(offset)
}

pub fn seek_to_beginning(session: &MediaSession) -> Result<i64> {
    seek_to(session, SeekTarget::Samples(0))
}

/// Seek to where a lyric line starts
pub fn seek_lyric(session: &MediaSession, line: &LyricLine) -> Result<i64> {
    let samples = timing_format(session)?.seconds_to_samples(line.timestamp.as_secs_f64());
    seek_to(session, SeekTarget::Samples(samples))
}

/// Seek forward (positive) or back (negative) from the current position
pub fn seek_relative(session: &MediaSession, delta_seconds: f64) -> Result<i64> {
    require_seekable(session)?;
    if !delta_seconds.is_finite() {
        return Err(Error::Positioning(format!("invalid seek delta {}", delta_seconds)));
    }
    let magnitude = timing_format(session)?.seconds_to_samples(delta_seconds.abs());
    let delta = if delta_seconds < 0.0 { -magnitude } else { magnitude };

    let transport = session.transport();
    let _lock = transport.position_lock();
    let _hold = transport.hold();

    let backend = session.backend();
    let current = backend
        .tell()
        .map_err(|e| Error::Positioning(e.to_string()))?;
    // Never seek before the start
    let delta = delta.max(-current);

    if session.is_output_open() {
        backend.drop_buffered_output();
    }
    let offset = backend
        .seek(delta, Whence::Current)
        .map_err(|e| Error::Positioning(format!("relative seek by {} failed: {}", delta, e)))?;
    debug!("Seeked by {} samples to {}", delta, offset);
    Ok(offset)
}
