//! Error types for mpr-engine
//!
//! Every failure a caller can see is one `Error` variant; `category()` groups
//! them the way front ends report them (precondition, negotiation,
//! positioning, radio).

use crate::backend::BackendError;
use crate::format::Encoding;
use mpr_common::PlaybackState;
use thiserror::Error;

/// Main error type for mpr-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Operation needs an open media session
    #[error("No media session is open")]
    SessionNotOpen,

    /// Operation needs an open output device
    #[error("Output device is not open")]
    OutputNotOpen,

    /// Requested output format is not supported by the backend
    #[error("Unsupported output format: {rate} Hz, {channels} ch, {encoding}")]
    UnsupportedFormat {
        rate: i64,
        channels: u8,
        encoding: Encoding,
    },

    /// Decoder/output format could not be agreed
    #[error("Format negotiation error: {0}")]
    Negotiation(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// State machine refused a transition
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: PlaybackState,
        to: PlaybackState,
    },

    /// Seek or position query failed
    #[error("Positioning error: {0}")]
    Positioning(String),

    /// Radio connection or ICY framing failure
    #[error("Radio stream error: {0}")]
    RadioStream(String),

    /// Decoder rejected fed bytes
    #[error("Feed rejected: {0}")]
    Feed(String),

    /// Equalizer band index outside 0-31
    #[error("Equalizer band {0} out of range (0-31)")]
    InvalidBand(usize),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP errors while talking to a radio station
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend failure outside a more specific context
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Common(#[from] mpr_common::Error),
}

/// Error grouping used by front ends to present notices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Session or device absent; never retried
    Precondition,
    /// Unsupported format, device open/start failure
    Negotiation,
    /// Seek failure
    Positioning,
    /// Radio connect/framing/feed failure
    Radio,
    Other,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SessionNotOpen | Error::OutputNotOpen | Error::InvalidTransition { .. } => {
                ErrorCategory::Precondition
            }
            Error::UnsupportedFormat { .. } | Error::Negotiation(_) | Error::AudioOutput(_) => {
                ErrorCategory::Negotiation
            }
            Error::Positioning(_) => ErrorCategory::Positioning,
            Error::RadioStream(_) | Error::Feed(_) | Error::Http(_) => ErrorCategory::Radio,
            _ => ErrorCategory::Other,
        }
    }
}

/// Convenience Result type using mpr-engine Error
pub type Result<T> = std::result::Result<T, Error>;
