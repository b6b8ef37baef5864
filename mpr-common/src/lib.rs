//! # MPR Common Library
//!
//! Shared types and utilities for the MPR player crates:
//! playback state and event notifications, LRC lyric parsing,
//! position formatting and configuration file discovery.

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod lyrics;

pub use error::{Error, Result};
pub use events::{EndReason, PlaybackState, PlayerEvent};
pub use lyrics::LyricLine;
