//! Native backend: symphonia decoding, software volume/equalizer and
//! pluggable output drivers.

pub mod decoder;
pub mod equalizer;
pub mod mpeg_frame;
pub mod output;

#[cfg(feature = "cpal-output")]
pub mod cpal_output;

use self::decoder::{ChunkResult, FeedDecoder, FileDecoder, PcmChunk, StreamSpec};
use self::equalizer::Equalizer;
use self::output::OutputDriver;
use crate::backend::{
    Backend, BackendError, BackendResult, ChannelGroup, DecodeStatus, DecodedFrame, VolumeInfo, Whence,
};
use crate::format::{channel_mask, Encoding, FormatDescriptor, CHANNELS_MONO, CHANNELS_STEREO, MPEG_RATES};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// Rates accepted beyond the MPEG set (high-resolution files)
const EXTRA_RATES: [i64; 2] = [88200, 96000];

/// Highest accepted base volume (boosted range)
const MAX_VOLUME: f64 = 3.0;

enum Media {
    File(FileDecoder),
    Feed(FeedDecoder),
}

impl Media {
    fn next_chunk(&mut self) -> ChunkResult {
        match self {
            Media::File(decoder) => decoder.next_chunk(),
            Media::Feed(decoder) => decoder.next_chunk(),
        }
    }

    fn spec(&self) -> Option<StreamSpec> {
        match self {
            Media::File(decoder) => Some(decoder.spec()),
            Media::Feed(decoder) => decoder.spec(),
        }
    }

    fn position(&self) -> u64 {
        match self {
            Media::File(decoder) => decoder.position(),
            Media::Feed(decoder) => decoder.position(),
        }
    }
}

#[derive(Default)]
struct DecodeState {
    media: Option<Media>,
    /// Chunk held back while a format change is reported
    pending: Option<PcmChunk>,
    /// Last stream format handed out through `get_format` or `NewFormat`
    reported: Option<StreamSpec>,
}

impl DecodeState {
    fn current_spec(&self) -> Option<StreamSpec> {
        self.pending
            .as_ref()
            .map(|chunk| chunk.spec)
            .or_else(|| self.media.as_ref().and_then(Media::spec))
    }
}

struct Mixer {
    base: f64,
    rva_db: f64,
    eq: Equalizer,
}

impl Mixer {
    fn actual_volume(&self) -> f64 {
        self.base * 10f64.powf(self.rva_db / 20.0)
    }
}

/// Centre and surround channels enter the front pair at -3 dB
const FOLD_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Map one interleaved frame onto `dst_channels` outputs.
///
/// Mono averages every channel. Stereo from a surround frame uses the
/// symphonia channel order (FL FR FC LFE, then surround pairs): centre goes
/// to both sides, surround pairs to their side, LFE is dropped, and the
/// result is scaled so a full-scale front channel stays in range.
fn remap_frame(frame: &[f32], dst_channels: usize) -> Vec<f32> {
    let mono = || frame.iter().sum::<f32>() / frame.len().max(1) as f32;
    match (frame.len(), dst_channels) {
        (_, 1) => vec![mono()],
        (1, _) => vec![frame[0]; dst_channels],
        (src, 2) if src > 2 => {
            let centre = frame[2] * FOLD_GAIN;
            let (mut left, mut right) = (frame[0] + centre, frame[1] + centre);
            let mut surround_pairs = 0;
            for pair in frame.get(4..).unwrap_or(&[]).chunks_exact(2) {
                left += pair[0] * FOLD_GAIN;
                right += pair[1] * FOLD_GAIN;
                surround_pairs += 1;
            }
            let scale = 1.0 / (1.0 + FOLD_GAIN * (1 + surround_pairs) as f32);
            vec![left * scale, right * scale]
        }
        _ => (0..dst_channels)
            .map(|ch| frame.get(ch).copied().unwrap_or_else(mono))
            .collect(),
    }
}

/// Backend built on symphonia and the drivers in [`output`]
pub struct NativeBackend {
    decode: Mutex<DecodeState>,
    accepted: Mutex<Option<FormatDescriptor>>,
    mixer: Mutex<Mixer>,
    output: Mutex<Option<Box<dyn OutputDriver>>>,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            decode: Mutex::new(DecodeState::default()),
            accepted: Mutex::new(None),
            mixer: Mutex::new(Mixer {
                base: 1.0,
                rva_db: 0.0,
                eq: Equalizer::new(),
            }),
            output: Mutex::new(None),
        }
    }

    /// Set the relative volume adjustment (replay gain) in decibels
    pub fn set_rva_db(&self, rva_db: f64) {
        self.mixer.lock().rva_db = rva_db;
    }

    /// Map, filter, scale and encode one chunk into `format`
    fn render(&self, chunk: PcmChunk, format: FormatDescriptor) -> Vec<u8> {
        let src_channels = chunk.spec.channels.max(1);
        let dst_channels = format.channels.max(1) as usize;

        let mut samples: Vec<f32> = if src_channels == dst_channels {
            chunk.samples
        } else {
            chunk
                .samples
                .chunks(src_channels)
                .flat_map(|frame| remap_frame(frame, dst_channels))
                .collect()
        };

        let gain = {
            let mut mixer = self.mixer.lock();
            mixer.eq.process(&mut samples, dst_channels, chunk.spec.rate);
            mixer.actual_volume() as f32
        };

        match format.encoding {
            Encoding::FLOAT_32 => samples
                .iter()
                .flat_map(|s| (s * gain).clamp(-1.0, 1.0).to_le_bytes())
                .collect(),
            _ => samples
                .iter()
                .map(|s| ((s * gain).clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .flat_map(i16::to_le_bytes)
                .collect(),
        }
    }

    fn with_output<T>(&self, f: impl FnOnce(&mut Box<dyn OutputDriver>) -> BackendResult<T>) -> BackendResult<T> {
        let mut output = self.output.lock();
        match output.as_mut() {
            Some(driver) => f(driver),
            None => Err(BackendError::NotOpen),
        }
    }
}

impl Backend for NativeBackend {
    fn open_file(&self, path: &Path) -> BackendResult<()> {
        let decoder = FileDecoder::open(path)?;
        let mut state = self.decode.lock();
        *state = DecodeState {
            media: Some(Media::File(decoder)),
            ..Default::default()
        };
        info!("Opened {}", path.display());
        Ok(())
    }

    fn open_feed(&self) -> BackendResult<()> {
        let mut state = self.decode.lock();
        *state = DecodeState {
            media: Some(Media::Feed(FeedDecoder::new())),
            ..Default::default()
        };
        debug!("Opened feed decoder");
        Ok(())
    }

    fn close(&self) {
        *self.decode.lock() = DecodeState::default();
    }

    fn decode_frame(&self) -> DecodedFrame {
        let chunk = {
            let mut state = self.decode.lock();
            let chunk = match state.pending.take() {
                Some(chunk) => chunk,
                None => {
                    let Some(media) = state.media.as_mut() else {
                        return DecodedFrame::status(DecodeStatus::Error("no media open".to_string()));
                    };
                    match media.next_chunk() {
                        ChunkResult::Chunk(chunk) => chunk,
                        ChunkResult::NeedMore => return DecodedFrame::status(DecodeStatus::NeedMore),
                        ChunkResult::Done => return DecodedFrame::status(DecodeStatus::Done),
                        ChunkResult::Error(msg) => return DecodedFrame::status(DecodeStatus::Error(msg)),
                    }
                }
            };

            if state.reported != Some(chunk.spec) {
                debug!(
                    "Stream format changed: {} Hz, {} ch",
                    chunk.spec.rate, chunk.spec.channels
                );
                state.reported = Some(chunk.spec);
                state.pending = Some(chunk);
                return DecodedFrame::status(DecodeStatus::NewFormat);
            }
            chunk
        };

        let accepted = *self.accepted.lock();
        let format = accepted.unwrap_or(FormatDescriptor::new(
            chunk.spec.rate as i64,
            chunk.spec.channels as u8,
            Encoding::SIGNED_16,
        ));
        DecodedFrame::ok(self.render(chunk, format))
    }

    fn feed(&self, data: &[u8]) -> BackendResult<()> {
        let mut state = self.decode.lock();
        match state.media.as_mut() {
            Some(Media::Feed(decoder)) => decoder.feed(data),
            Some(Media::File(_)) => Err(BackendError::Unsupported("feed on a file decoder".to_string())),
            None => Err(BackendError::NotOpen),
        }
    }

    fn get_format(&self) -> BackendResult<FormatDescriptor> {
        let mut state = self.decode.lock();
        if state.media.is_none() {
            return Err(BackendError::NotOpen);
        }
        let spec = state.current_spec().ok_or(BackendError::NeedMore)?;
        state.reported = Some(spec);
        Ok(FormatDescriptor::new(
            spec.rate as i64,
            spec.channels.min(u8::MAX as usize) as u8,
            Encoding::SIGNED_16,
        ))
    }

    fn clear_format(&self) {
        *self.accepted.lock() = None;
    }

    fn set_format(&self, format: FormatDescriptor) -> BackendResult<()> {
        if self.format_support(format.rate, format.encoding) & channel_mask(format.channels) == 0 {
            return Err(BackendError::Unsupported(format!("output format {}", format)));
        }
        *self.accepted.lock() = Some(format);
        Ok(())
    }

    fn supported_rates(&self) -> Vec<i64> {
        let mut rates: Vec<i64> = MPEG_RATES.iter().chain(EXTRA_RATES.iter()).copied().collect();
        rates.sort_unstable();
        rates
    }

    fn supported_encodings(&self) -> Vec<Encoding> {
        vec![Encoding::SIGNED_16, Encoding::FLOAT_32]
    }

    fn format_support(&self, rate: i64, encoding: Encoding) -> u8 {
        if self.supported_rates().contains(&rate) && self.supported_encodings().contains(&encoding) {
            CHANNELS_MONO | CHANNELS_STEREO
        } else {
            0
        }
    }

    fn seek(&self, offset: i64, whence: Whence) -> BackendResult<i64> {
        let mut state = self.decode.lock();
        let pending_frames = state.pending.as_ref().map_or(0, PcmChunk::frames) as i64;
        let target = match state.media.as_mut() {
            Some(Media::File(decoder)) => {
                let origin = match whence {
                    Whence::Set => 0,
                    Whence::Current => decoder.position() as i64 - pending_frames,
                    Whence::End => decoder
                        .length()
                        .ok_or_else(|| BackendError::Unsupported("stream length unknown".to_string()))?
                        as i64,
                };
                let target = (origin + offset).max(0) as u64;
                decoder.seek(target)?
            }
            Some(Media::Feed(_)) => {
                return Err(BackendError::Unsupported("cannot seek a live stream".to_string()));
            }
            None => return Err(BackendError::NotOpen),
        };
        state.pending = None;
        Ok(target as i64)
    }

    fn tell(&self) -> BackendResult<i64> {
        let state = self.decode.lock();
        let media = state.media.as_ref().ok_or(BackendError::NotOpen)?;
        let pending_frames = state.pending.as_ref().map_or(0, PcmChunk::frames);
        Ok(media.position().saturating_sub(pending_frames) as i64)
    }

    fn length(&self) -> Option<i64> {
        match self.decode.lock().media.as_ref() {
            Some(Media::File(decoder)) => decoder.length().map(|n| n as i64),
            _ => None,
        }
    }

    fn open_output(&self, driver: &str, device: Option<&str>) -> BackendResult<()> {
        let mut output = self.output.lock();
        if output.is_some() {
            return Ok(());
        }
        let opened = output::open_driver(driver, device)?;
        info!("Opened output driver '{}'", opened.name());
        *output = Some(opened);
        Ok(())
    }

    fn start_output(&self, format: FormatDescriptor) -> BackendResult<()> {
        if self.format_support(format.rate, format.encoding) & channel_mask(format.channels) == 0 {
            return Err(BackendError::Unsupported(format!("output format {}", format)));
        }
        self.with_output(|driver| driver.start(format))
    }

    fn write_output(&self, data: &[u8]) -> BackendResult<usize> {
        self.with_output(|driver| driver.write(data))
    }

    fn drop_buffered_output(&self) {
        if let Some(driver) = self.output.lock().as_mut() {
            driver.drop_buffered();
        }
    }

    fn stop_output(&self) {
        if let Some(driver) = self.output.lock().as_mut() {
            driver.stop();
        }
    }

    fn close_output(&self) {
        if let Some(mut driver) = self.output.lock().take() {
            if let Err(e) = driver.close() {
                tracing::warn!("Closing output driver '{}' failed: {}", driver.name(), e);
            }
        }
    }

    fn set_volume(&self, base: f64) -> BackendResult<()> {
        if !base.is_finite() || !(0.0..=MAX_VOLUME).contains(&base) {
            return Err(BackendError::Unsupported(format!("volume {}", base)));
        }
        self.mixer.lock().base = base;
        Ok(())
    }

    fn get_volume(&self) -> VolumeInfo {
        let mixer = self.mixer.lock();
        VolumeInfo {
            base: mixer.base,
            actual: mixer.actual_volume(),
            rva_db: mixer.rva_db,
        }
    }

    fn set_eq_band(&self, group: ChannelGroup, band: usize, factor: f64) -> BackendResult<()> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(BackendError::Unsupported(format!("equalizer factor {}", factor)));
        }
        if band >= super::EQ_BANDS {
            return Err(BackendError::Unsupported(format!("equalizer band {}", band)));
        }
        self.mixer.lock().eq.set_band(group, band, factor);
        Ok(())
    }

    fn get_eq_band(&self, group: ChannelGroup, band: usize) -> f64 {
        self.mixer.lock().eq.band(group, band)
    }

    fn reset_eq(&self) {
        self.mixer.lock().eq.reset();
    }
}
