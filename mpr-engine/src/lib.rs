//! # MPR Playback Engine (mpr-engine)
//!
//! Decode→output streaming for local files and internet radio with a
//! four-state transport (stopped/playing/paused/stopping), sample-accurate
//! seeking and ICY metadata extraction.
//!
//! **Architecture:** callers open a [`MediaSession`] over a [`Backend`],
//! then drive it through [`PlaybackEngine`] and the [`position`] tools.
//! The bundled [`NativeBackend`] decodes with symphonia and renders through
//! pluggable output drivers.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod position;
pub mod probe;
pub mod radio;
pub mod session;
pub mod transport;

pub use backend::{Backend, NativeBackend};
pub use config::EngineConfig;
pub use engine::PlaybackEngine;
pub use error::{Error, ErrorCategory, Result};
pub use format::{Encoding, FormatDescriptor};
pub use position::SeekTarget;
pub use session::{MediaSession, MediaSource};
