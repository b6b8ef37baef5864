//! Playback state machine and decode-loop handshake for one media session
//!
//! A single mutex guards the playback state together with the positioning
//! `hold` flag and the decode loop's `in_flight` flag, and one condition
//! variable signals every change. The decode loop claims a write slot
//! (`begin_write`) under the same lock that checks hold/pause/stop, so a
//! seek can never slip between the check and the claim.

use crate::error::{Error, Result};
use mpr_common::PlaybackState;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a single condition-variable wait
const WAKE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Flags {
    state: PlaybackState,
    hold: bool,
    in_flight: bool,
}

/// Result of asking for permission to decode and write one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSlot {
    /// Buffer marked in flight; call `end_write` when the write completes
    Granted,
    /// Stop requested or already stopped; leave the loop
    Stop,
}

/// Whether `from -> to` is a legal edge of the playback state machine
pub fn transition_allowed(from: PlaybackState, to: PlaybackState) -> bool {
    use PlaybackState::*;
    matches!(
        (from, to),
        (Stopped, Playing)
            | (Paused, Playing)
            | (Playing, Paused)
            | (Playing, Stopping)
            | (Paused, Stopping)
            | (Stopping, Stopped)
            | (Playing, Stopped)
            | (Paused, Stopped)
    )
}

pub struct Transport {
    flags: Mutex<Flags>,
    changed: Condvar,
    /// Serializes every position query/seek
    position_lock: Mutex<()>,
    /// Serializes play/stop/close so only one caller negotiates or tears down
    control: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                state: PlaybackState::Stopped,
                hold: false,
                in_flight: false,
            }),
            changed: Condvar::new(),
            position_lock: Mutex::new(()),
            control: Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.flags.lock().state
    }

    /// Move to `to`, returning the previous state.
    ///
    /// Same-state transitions are accepted and change nothing.
    pub fn transition(&self, to: PlaybackState) -> Result<PlaybackState> {
        let mut flags = self.flags.lock();
        self.apply(&mut flags, to)
    }

    /// Single point where the state changes; caller holds the flags lock
    fn apply(&self, flags: &mut Flags, to: PlaybackState) -> Result<PlaybackState> {
        let from = flags.state;
        if from == to {
            return Ok(from);
        }
        if !transition_allowed(from, to) {
            return Err(Error::InvalidTransition { from, to });
        }
        flags.state = to;
        debug!("Playback state {} -> {}", from, to);
        self.changed.notify_all();
        Ok(from)
    }

    /// Ask a running loop to stop. Returns the state seen before the request.
    pub fn request_stop(&self) -> PlaybackState {
        let mut flags = self.flags.lock();
        let from = flags.state;
        if from.is_active() {
            if let Err(e) = self.apply(&mut flags, PlaybackState::Stopping) {
                warn!("Stop request rejected: {}", e);
            }
        }
        from
    }

    /// Record that the decode loop exited. Returns the state it left behind
    /// when that state changed.
    pub fn finish_loop(&self) -> Option<PlaybackState> {
        let mut flags = self.flags.lock();
        flags.in_flight = false;
        self.changed.notify_all();
        match self.apply(&mut flags, PlaybackState::Stopped) {
            Ok(from) if from != PlaybackState::Stopped => Some(from),
            Ok(_) => None,
            Err(e) => {
                warn!("Loop exit left state unchanged: {}", e);
                None
            }
        }
    }

    /// Block until the loop may write, or until it must stop.
    ///
    /// Waits while paused or while a positioning operation holds the loop.
    pub fn begin_write(&self) -> WriteSlot {
        let mut flags = self.flags.lock();
        loop {
            match flags.state {
                PlaybackState::Stopping | PlaybackState::Stopped => return WriteSlot::Stop,
                PlaybackState::Playing if !flags.hold => {
                    flags.in_flight = true;
                    return WriteSlot::Granted;
                }
                _ => {
                    self.changed.wait_for(&mut flags, WAKE_INTERVAL);
                }
            }
        }
    }

    /// Clear the in-flight mark set by `begin_write`
    pub fn end_write(&self) {
        let mut flags = self.flags.lock();
        flags.in_flight = false;
        self.changed.notify_all();
    }

    pub fn is_in_flight(&self) -> bool {
        self.flags.lock().in_flight
    }

    pub fn is_held(&self) -> bool {
        self.flags.lock().hold
    }

    /// Hold the decode loop and wait for any in-flight buffer to finish.
    /// The loop resumes when the guard drops.
    pub fn hold(&self) -> HoldGuard<'_> {
        let mut flags = self.flags.lock();
        flags.hold = true;
        while flags.in_flight {
            self.changed.wait_for(&mut flags, WAKE_INTERVAL);
        }
        HoldGuard { transport: self }
    }

    fn release_hold(&self) {
        let mut flags = self.flags.lock();
        flags.hold = false;
        self.changed.notify_all();
    }

    /// Block until the state is `Stopped`
    pub fn wait_until_stopped(&self) {
        let mut flags = self.flags.lock();
        while flags.state != PlaybackState::Stopped {
            self.changed.wait_for(&mut flags, WAKE_INTERVAL);
        }
    }

    pub fn position_lock(&self) -> MutexGuard<'_, ()> {
        self.position_lock.lock()
    }

    pub fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock()
    }

    pub fn set_worker(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.worker.lock().replace(handle) {
            // Only reachable if a finished loop was never reaped
            if previous.join().is_err() {
                warn!("Previous decode worker panicked");
            }
        }
    }

    /// Join a decode worker that has exited (or is about to)
    pub fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Decode worker panicked");
            }
        }
    }

    /// Stop a running loop and wait for it to exit. Returns the state seen
    /// before the request.
    pub fn shutdown(&self) -> PlaybackState {
        let prior = self.request_stop();
        self.wait_until_stopped();
        self.join_worker();
        prior
    }
}

/// Keeps the decode loop held until dropped
pub struct HoldGuard<'a> {
    transport: &'a Transport,
}

impl Drop for HoldGuard<'_> {
    fn drop(&mut self) {
        self.transport.release_hold();
    }
}
