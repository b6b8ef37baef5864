//! Playback state and player event types shared by the engine and front ends

use serde::{Deserialize, Serialize};

/// Player event notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state changed
    StateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
    },

    /// Output format agreed between decoder and output device
    FormatNegotiated {
        rate: i64,
        channels: u8,
        encoding: String,
    },

    /// Station metadata changed ("now playing" text of a radio stream)
    NowPlaying {
        title: String,
        raw: String,
    },

    /// Volume changed
    VolumeChanged {
        base: f64,
        actual: f64,
    },

    /// Decode loop exited
    PlaybackEnded {
        reason: EndReason,
    },
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::FormatNegotiated { .. } => "FormatNegotiated",
            PlayerEvent::NowPlaying { .. } => "NowPlaying",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::PlaybackEnded { .. } => "PlaybackEnded",
        }
    }
}

/// Playback state of one media session.
///
/// `Stopping` is transient: a stop was requested and the decode loop has not
/// yet observed it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Stopping,
}

impl PlaybackState {
    /// True while a decode loop may be running for the session
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Why a decode loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// Decoder reached end of stream
    Finished,
    /// A caller requested stop
    Stopped,
    /// Decoder reported a status outside ok/new-format/need-more/done
    DecoderError(String),
    /// Radio feed cycle failed (network or feed rejection)
    FeedFailed(String),
    /// Writing to the output device failed
    OutputFailed(String),
}

impl EndReason {
    /// True when playback ended because something went wrong
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EndReason::DecoderError(_) | EndReason::FeedFailed(_) | EndReason::OutputFailed(_)
        )
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::Finished => write!(f, "finished"),
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::DecoderError(msg) => write!(f, "decoder error: {}", msg),
            EndReason::FeedFailed(msg) => write!(f, "feed failed: {}", msg),
            EndReason::OutputFailed(msg) => write!(f, "output failed: {}", msg),
        }
    }
}
