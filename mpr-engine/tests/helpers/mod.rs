//! Test helper modules for mpr-engine integration tests
//!
//! - MockBackend: instrumented backend recording every call in order
//! - icy_stream: crafted ICY byte streams and slow readers
//! - audio_generator: WAV fixtures for the native backend

#![allow(dead_code)]

pub mod audio_generator;
pub mod icy_stream;
pub mod mock_backend;

pub use icy_stream::{icy_stream, metadata_block, TrickleReader};
pub use mock_backend::{Call, MockBackend};

use crossbeam_channel::Receiver;
use mpr_common::{EndReason, PlayerEvent};
use std::time::{Duration, Instant};

/// Wait for the next `PlaybackEnded` event
pub fn wait_for_end(events: &Receiver<PlayerEvent>, timeout: Duration) -> Option<EndReason> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match events.recv_timeout(remaining) {
            Ok(PlayerEvent::PlaybackEnded { reason }) => return Some(reason),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
