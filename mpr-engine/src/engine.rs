//! Playback engine: state machine operations and the decode→output loop
//!
//! The engine itself holds only configuration and the event hub; all
//! per-source state lives in the [`MediaSession`] passed to each call.
//! `play` negotiates the output format, opens/starts the output and spawns
//! one decode worker per session. The worker pulls frames (feeding the
//! decoder from the radio stream when it runs dry) and writes them to the
//! output until the stream ends or a stop is requested.

use crate::backend::{BackendError, ChannelGroup, DecodeStatus, VolumeInfo, EQ_BANDS};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::EventHub;
use crate::format::FormatDescriptor;
use crate::position;
use crate::probe;
use crate::radio;
use crate::session::MediaSession;
use crate::transport::WriteSlot;
use crossbeam_channel::Receiver;
use mpr_common::{EndReason, PlaybackState, PlayerEvent};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Highest volume without boost
pub const MAX_VOLUME: f64 = 1.0;
/// Highest volume with boost
pub const MAX_BOOSTED_VOLUME: f64 = 3.0;

/// Result of one decode/write cycle
enum Cycle {
    Continue,
    End(EndReason),
}

#[derive(Clone)]
pub struct PlaybackEngine {
    config: Arc<EngineConfig>,
    events: EventHub,
}

impl PlaybackEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            events: EventHub::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, session: &MediaSession) -> PlaybackState {
        session.state()
    }

    pub fn is_playing(&self, session: &MediaSession) -> bool {
        session.state() == PlaybackState::Playing
    }

    fn require_open(session: &MediaSession) -> Result<()> {
        if session.is_open() {
            Ok(())
        } else {
            Err(Error::SessionNotOpen)
        }
    }

    fn publish_state(&self, old_state: PlaybackState, new_state: PlaybackState) {
        if old_state != new_state {
            self.events.publish(PlayerEvent::StateChanged { old_state, new_state });
        }
    }

    /// Start or resume playback.
    ///
    /// From `Paused` the running loop simply resumes. From `Stopped` the
    /// format is negotiated, the output opened and started, and a decode
    /// worker spawned. Calling it while `Playing` does nothing.
    pub fn play(&self, session: &Arc<MediaSession>) -> Result<()> {
        Self::require_open(session)?;
        let transport = session.transport();
        let _control = transport.control();

        match transport.state() {
            PlaybackState::Playing => {
                debug!("Play ignored: already playing");
                return Ok(());
            }
            PlaybackState::Paused => {
                let old = transport.transition(PlaybackState::Playing)?;
                self.publish_state(old, PlaybackState::Playing);
                info!("Playback resumed");
                return Ok(());
            }
            PlaybackState::Stopping => transport.wait_until_stopped(),
            PlaybackState::Stopped => {}
        }

        // Reap a loop that ended on its own
        transport.join_worker();

        let format = self.negotiate(session)?;
        self.open_output(session)?;
        self.start_output(session, format)?;

        let old = transport.transition(PlaybackState::Playing)?;
        self.publish_state(old, PlaybackState::Playing);

        let worker_engine = self.clone();
        let worker_session = Arc::clone(session);
        let handle = std::thread::Builder::new()
            .name("mpr-decode".to_string())
            .spawn(move || worker_engine.decode_loop(worker_session))
            .map_err(|e| {
                transport.finish_loop();
                Error::Playback(format!("Failed to spawn decode worker: {}", e))
            })?;
        transport.set_worker(handle);

        info!("Playback started: {} ({})", session.source(), format);
        Ok(())
    }

    /// Suspend buffer writes without tearing down the output
    pub fn pause(&self, session: &MediaSession) -> Result<()> {
        Self::require_open(session)?;
        let transport = session.transport();
        match transport.state() {
            PlaybackState::Playing => {
                let old = transport.transition(PlaybackState::Paused)?;
                self.publish_state(old, PlaybackState::Paused);
                info!("Playback paused");
            }
            state => debug!("Pause ignored in state {}", state),
        }
        Ok(())
    }

    /// Pause when playing, otherwise play
    pub fn toggle_pause(&self, session: &Arc<MediaSession>) -> Result<()> {
        if self.is_playing(session) {
            self.pause(session)
        } else {
            self.play(session)
        }
    }

    /// Stop playback and wait until the loop has exited.
    ///
    /// With `reset_position` a file session is rewound to sample 0; radio
    /// sessions have no beginning and are left where they are.
    pub fn stop(&self, session: &MediaSession, reset_position: bool) -> Result<()> {
        Self::require_open(session)?;
        let transport = session.transport();
        let _control = transport.control();

        let prior = transport.request_stop();
        if prior.is_active() {
            self.publish_state(prior, PlaybackState::Stopping);
        }
        transport.wait_until_stopped();
        transport.join_worker();

        if session.is_output_open() {
            session.backend().stop_output();
        }

        if reset_position {
            if session.is_radio_station() {
                debug!("Stop on radio session: dropping position tracking");
            } else {
                position::seek_to_beginning(session)?;
            }
        }

        if prior != PlaybackState::Stopped {
            info!("Playback stopped");
        }
        Ok(())
    }

    /// Agree on an output format with the decoder and tell the backend.
    ///
    /// Radio decoders know nothing until fed, so they are primed first.
    fn negotiate(&self, session: &MediaSession) -> Result<FormatDescriptor> {
        let backend = session.backend();
        let decoded = match backend.get_format() {
            Ok(format) => format,
            Err(BackendError::NeedMore) if session.is_radio_station() => self.prime_radio(session)?,
            Err(e) => return Err(Error::Negotiation(format!("decoder format unavailable: {}", e))),
        };

        let channels = probe::output_channels(decoded.channels);
        if channels != decoded.channels {
            debug!("Folding {} decoded channels down to {}", decoded.channels, channels);
        }
        let encoding = probe::choose_encoding(session, decoded.rate, channels, self.config.preferred_encoding())?;
        let format = FormatDescriptor::new(decoded.rate, channels, encoding);

        backend.clear_format();
        backend
            .set_format(format)
            .map_err(|e| Error::Negotiation(format!("backend refused {}: {}", format, e)))?;
        session.set_current_format(Some(format));

        debug!("Negotiated {}", format);
        self.events.publish(PlayerEvent::FormatNegotiated {
            rate: format.rate,
            channels: format.channels,
            encoding: format.encoding.to_string(),
        });
        Ok(format)
    }

    /// Feed the radio stream until the decoder can name its format
    fn prime_radio(&self, session: &MediaSession) -> Result<FormatDescriptor> {
        let cycles = self.config.playback.radio_prime_cycles.max(1);
        for cycle in 0..cycles {
            self.feed_radio(session)?;
            match session.backend().get_format() {
                Ok(format) => {
                    debug!("Radio stream format known after {} feed cycles", cycle + 1);
                    return Ok(format);
                }
                Err(BackendError::NeedMore) => continue,
                Err(e) => return Err(Error::Negotiation(e.to_string())),
            }
        }
        Err(Error::Negotiation(format!(
            "no decodable frame after {} feed cycles",
            cycles
        )))
    }

    /// One feed cycle, publishing station metadata changes
    fn feed_radio(&self, session: &MediaSession) -> Result<()> {
        if let Some(outcome) = radio::feed(session)? {
            if let Some(metadata) = outcome.metadata {
                self.events.publish(PlayerEvent::NowPlaying {
                    title: metadata.title,
                    raw: metadata.raw,
                });
            }
        }
        Ok(())
    }

    /// Decode worker body; runs until the stream ends or a stop is observed
    fn decode_loop(&self, session: Arc<MediaSession>) {
        let transport = session.transport();
        debug!("Decode worker started for {}", session.source());

        let reason = loop {
            if transport.begin_write() == WriteSlot::Stop {
                break EndReason::Stopped;
            }
            let cycle = self.run_cycle(&session);
            transport.end_write();

            match cycle {
                Cycle::Continue => continue,
                Cycle::End(reason) => break reason,
            }
        };

        if let Some(old) = transport.finish_loop() {
            self.publish_state(old, PlaybackState::Stopped);
        }

        match &reason {
            EndReason::Finished => info!("Playback finished: {}", session.source()),
            EndReason::Stopped => debug!("Decode worker stopped"),
            EndReason::DecoderError(msg) => warn!("Playback ended by decoder status: {}", msg),
            EndReason::FeedFailed(msg) => error!("Radio feed failed, playback ended: {}", msg),
            EndReason::OutputFailed(msg) => error!("Audio output failed, playback ended: {}", msg),
        }
        session.set_last_end(reason.clone());
        self.events.publish(PlayerEvent::PlaybackEnded { reason });
    }

    /// Decode one frame (feeding radio input when needed) and write it out
    fn run_cycle(&self, session: &MediaSession) -> Cycle {
        let backend = session.backend();
        let frame = backend.decode_frame();

        match frame.status {
            DecodeStatus::Ok => match self.write_all(session, &frame.data) {
                Ok(()) => Cycle::Continue,
                Err(e) => Cycle::End(EndReason::OutputFailed(e.to_string())),
            },
            DecodeStatus::NewFormat => {
                debug!("Decoder reported a new format; renegotiating");
                match self
                    .negotiate(session)
                    .and_then(|format| self.start_output(session, format))
                {
                    Ok(()) => Cycle::Continue,
                    Err(e) => Cycle::End(EndReason::OutputFailed(e.to_string())),
                }
            }
            DecodeStatus::NeedMore if session.is_radio_station() => match self.feed_radio(session) {
                Ok(()) => Cycle::Continue,
                Err(e) => Cycle::End(EndReason::FeedFailed(e.to_string())),
            },
            DecodeStatus::NeedMore => {
                Cycle::End(EndReason::DecoderError("decoder needs input on a file source".to_string()))
            }
            DecodeStatus::Done => Cycle::End(EndReason::Finished),
            DecodeStatus::Error(msg) => Cycle::End(EndReason::DecoderError(msg)),
        }
    }

    fn write_all(&self, session: &MediaSession, mut data: &[u8]) -> Result<()> {
        let backend = session.backend();
        while !data.is_empty() {
            let written = backend
                .write_output(data)
                .map_err(|e| Error::AudioOutput(e.to_string()))?;
            if written == 0 {
                return Err(Error::AudioOutput("output accepted no data".to_string()));
            }
            data = &data[written.min(data.len())..];
        }
        Ok(())
    }

    /// Open the configured output device; no-op when already open
    pub fn open_output(&self, session: &MediaSession) -> Result<()> {
        Self::require_open(session)?;
        if session.is_output_open() {
            return Ok(());
        }
        let output = &self.config.output;
        session
            .backend()
            .open_output(&output.driver, output.device.as_deref())
            .map_err(|e| Error::AudioOutput(format!("Failed to open output '{}': {}", output.driver, e)))?;
        session.set_output_open(true);
        info!("Output '{}' opened", output.driver);
        Ok(())
    }

    /// Start the output stream in `format`
    pub fn start_output(&self, session: &MediaSession, format: FormatDescriptor) -> Result<()> {
        Self::require_open(session)?;
        if !session.is_output_open() {
            return Err(Error::OutputNotOpen);
        }
        if !probe::is_supported(session, format) {
            return Err(Error::UnsupportedFormat {
                rate: format.rate,
                channels: format.channels,
                encoding: format.encoding,
            });
        }
        session
            .backend()
            .start_output(format)
            .map_err(|e| Error::AudioOutput(format!("Failed to start output with {}: {}", format, e)))?;
        debug!("Output started with {}", format);
        Ok(())
    }

    /// Stop and close the output; no-op when not open.
    ///
    /// A running loop is stopped first so it never writes to a closed device.
    pub fn close_output(&self, session: &MediaSession) -> Result<()> {
        if !session.is_output_open() {
            return Ok(());
        }
        if session.state() != PlaybackState::Stopped {
            self.stop(session, false)?;
        }
        let backend = session.backend();
        backend.stop_output();
        backend.close_output();
        session.set_output_open(false);
        info!("Output closed");
        Ok(())
    }

    /// Set the linear volume, clamped to 0-1 (0-3 with boost).
    /// Returns the value applied.
    pub fn set_volume(&self, session: &MediaSession, linear: f64, boosted: bool) -> Result<f64> {
        if linear.is_nan() {
            return Err(Error::AudioOutput("volume is not a number".to_string()));
        }
        let max = if boosted { MAX_BOOSTED_VOLUME } else { MAX_VOLUME };
        let volume = linear.clamp(0.0, max);

        let backend = session.backend();
        backend
            .set_volume(volume)
            .map_err(|e| Error::AudioOutput(format!("Failed to set volume {}: {}", volume, e)))?;

        let info = backend.get_volume();
        debug!("Volume set to {:.3} (actual {:.3})", info.base, info.actual);
        self.events.publish(PlayerEvent::VolumeChanged {
            base: info.base,
            actual: info.actual,
        });
        Ok(volume)
    }

    pub fn get_volume(&self, session: &MediaSession) -> VolumeInfo {
        session.backend().get_volume()
    }

    fn check_band(band: usize) -> Result<()> {
        if band < EQ_BANDS {
            Ok(())
        } else {
            Err(Error::InvalidBand(band))
        }
    }

    pub fn set_equalizer_band(&self, session: &MediaSession, group: ChannelGroup, band: usize, factor: f64) -> Result<()> {
        Self::check_band(band)?;
        session
            .backend()
            .set_eq_band(group, band, factor)
            .map_err(|e| Error::AudioOutput(format!("Failed to set equalizer band {}: {}", band, e)))
    }

    /// Set every band in `bands` to the same factor
    pub fn set_equalizer_range(
        &self,
        session: &MediaSession,
        group: ChannelGroup,
        bands: RangeInclusive<usize>,
        factor: f64,
    ) -> Result<()> {
        Self::check_band(*bands.start())?;
        Self::check_band(*bands.end())?;
        for band in bands {
            self.set_equalizer_band(session, group, band, factor)?;
        }
        Ok(())
    }

    pub fn reset_equalizer(&self, session: &MediaSession) {
        session.backend().reset_eq();
        debug!("Equalizer reset");
    }

    pub fn get_equalizer_band(&self, session: &MediaSession, group: ChannelGroup, band: usize) -> Result<f64> {
        Self::check_band(band)?;
        Ok(session.backend().get_eq_band(group, band))
    }
}
