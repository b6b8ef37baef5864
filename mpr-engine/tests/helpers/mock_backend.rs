//! Instrumented backend for engine tests
//!
//! Produces silent frames of a fixed size, records every call in order and
//! can be told to stall writes, reject input, fail seeks or replay scripted
//! decoder statuses.

use mpr_engine::backend::{
    Backend, BackendError, BackendResult, ChannelGroup, DecodeStatus, DecodedFrame, VolumeInfo, Whence,
    EQ_BANDS,
};
use mpr_engine::format::{Encoding, FormatDescriptor, CHANNELS_MONO, CHANNELS_STEREO};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Samples per decoded frame
pub const FRAME_SAMPLES: i64 = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OpenFile,
    OpenFeed,
    Close,
    Feed(usize),
    ClearFormat,
    SetFormat(FormatDescriptor),
    Seek(i64, Whence),
    DropBuffered,
    OpenOutput(String),
    StartOutput(FormatDescriptor),
    WriteStart(usize),
    WriteEnd(usize),
    StopOutput,
    CloseOutput,
    SetVolume(f64),
    SetEq(ChannelGroup, usize, f64),
    ResetEq,
}

struct MockState {
    decoded: FormatDescriptor,
    accepted: Option<FormatDescriptor>,
    position: i64,
    length: Option<i64>,
    frames_left: Option<usize>,
    script: VecDeque<DecodeStatus>,
    /// Format `get_format` reports once a scripted `NewFormat` is returned
    next_format: Option<FormatDescriptor>,
    feed_mode: bool,
    fed_total: usize,
    buffered: usize,
    bytes_per_frame_in: usize,
    output_open: bool,
    volume: f64,
    eq: [[f64; EQ_BANDS]; 2],
}

pub struct MockBackend {
    calls: Mutex<Vec<Call>>,
    state: Mutex<MockState>,
    rates: Vec<i64>,
    encodings: Vec<Encoding>,
    stereo_only: bool,
    write_delay: Duration,
    max_write: Option<usize>,
    reject_feed: bool,
    fail_seek: bool,
}

impl MockBackend {
    fn with_state(state: MockState) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(state),
            rates: vec![44100, 48000],
            encodings: vec![Encoding::SIGNED_16, Encoding::FLOAT_32],
            stereo_only: false,
            write_delay: Duration::ZERO,
            max_write: None,
            reject_feed: false,
            fail_seek: false,
        }
    }

    fn base_state(frames: Option<usize>) -> MockState {
        MockState {
            decoded: FormatDescriptor::new(44100, 2, Encoding::SIGNED_16),
            accepted: None,
            position: 0,
            length: frames.map(|n| n as i64 * FRAME_SAMPLES),
            frames_left: frames,
            script: VecDeque::new(),
            next_format: None,
            feed_mode: false,
            fed_total: 0,
            buffered: 0,
            bytes_per_frame_in: 0,
            output_open: false,
            volume: 1.0,
            eq: [[1.0; EQ_BANDS]; 2],
        }
    }

    /// File-like source of `frames` frames at 44.1 kHz stereo
    pub fn file(frames: usize) -> Self {
        Self::with_state(Self::base_state(Some(frames)))
    }

    /// File-like source that never ends and has no known length
    pub fn endless() -> Self {
        Self::with_state(Self::base_state(None))
    }

    /// Feed decoder that knows its format once `bytes_per_frame` bytes
    /// arrived and decodes one frame per `bytes_per_frame` bytes fed
    pub fn feed(bytes_per_frame: usize) -> Self {
        let mut state = Self::base_state(None);
        state.feed_mode = true;
        state.bytes_per_frame_in = bytes_per_frame.max(1);
        Self::with_state(state)
    }

    pub fn with_format(self, rate: i64, channels: u8) -> Self {
        self.state.lock().decoded = FormatDescriptor::new(rate, channels, Encoding::SIGNED_16);
        self
    }

    pub fn with_rates(mut self, rates: &[i64]) -> Self {
        self.rates = rates.to_vec();
        self
    }

    pub fn with_encodings(mut self, encodings: &[Encoding]) -> Self {
        self.encodings = encodings.to_vec();
        self
    }

    pub fn stereo_only(mut self) -> Self {
        self.stereo_only = true;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Accept at most `max` bytes per write
    pub fn with_max_write(mut self, max: usize) -> Self {
        self.max_write = Some(max);
        self
    }

    pub fn rejecting_feed(mut self) -> Self {
        self.reject_feed = true;
        self
    }

    pub fn failing_seek(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    /// Statuses returned (in order) before normal decoding
    pub fn with_script(self, statuses: &[DecodeStatus]) -> Self {
        self.state.lock().script.extend(statuses.iter().cloned());
        self
    }

    /// Report `NewFormat` on the first decode and `rate`/`channels` after it
    pub fn with_format_change(self, rate: i64, channels: u8) -> Self {
        {
            let mut state = self.state.lock();
            state.script.push_back(DecodeStatus::NewFormat);
            state.next_format = Some(FormatDescriptor::new(rate, channels, Encoding::SIGNED_16));
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub fn writes(&self) -> usize {
        self.count(|call| matches!(call, Call::WriteEnd(_)))
    }

    pub fn bytes_written(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .map(|call| match call {
                Call::WriteEnd(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn fed(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Feed(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self) -> i64 {
        self.state.lock().position
    }

    pub fn accepted_format(&self) -> Option<FormatDescriptor> {
        self.state.lock().accepted
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn frame_data(state: &MockState) -> Vec<u8> {
        let format = state.accepted.unwrap_or(state.decoded);
        vec![0u8; FRAME_SAMPLES as usize * format.frame_bytes().max(1)]
    }
}

impl Backend for MockBackend {
    fn open_file(&self, _path: &Path) -> BackendResult<()> {
        self.record(Call::OpenFile);
        Ok(())
    }

    fn open_feed(&self) -> BackendResult<()> {
        self.record(Call::OpenFeed);
        Ok(())
    }

    fn close(&self) {
        self.record(Call::Close);
    }

    fn decode_frame(&self) -> DecodedFrame {
        let mut state = self.state.lock();
        if let Some(status) = state.script.pop_front() {
            if status == DecodeStatus::NewFormat {
                if let Some(format) = state.next_format.take() {
                    state.decoded = format;
                }
            }
            return DecodedFrame::status(status);
        }

        if state.feed_mode {
            if state.buffered < state.bytes_per_frame_in {
                return DecodedFrame::status(DecodeStatus::NeedMore);
            }
            state.buffered -= state.bytes_per_frame_in;
        } else {
            if let Some(left) = state.frames_left.as_mut() {
                if *left == 0 {
                    return DecodedFrame::status(DecodeStatus::Done);
                }
                *left -= 1;
            }
        }

        state.position += FRAME_SAMPLES;
        DecodedFrame::ok(Self::frame_data(&state))
    }

    fn feed(&self, data: &[u8]) -> BackendResult<()> {
        self.record(Call::Feed(data.len()));
        if self.reject_feed {
            return Err(BackendError::Failed("decoder rejected input".to_string()));
        }
        let mut state = self.state.lock();
        state.fed_total += data.len();
        state.buffered += data.len();
        Ok(())
    }

    fn get_format(&self) -> BackendResult<FormatDescriptor> {
        let state = self.state.lock();
        if state.feed_mode && state.fed_total < state.bytes_per_frame_in {
            return Err(BackendError::NeedMore);
        }
        Ok(state.decoded)
    }

    fn clear_format(&self) {
        self.record(Call::ClearFormat);
        self.state.lock().accepted = None;
    }

    fn set_format(&self, format: FormatDescriptor) -> BackendResult<()> {
        self.record(Call::SetFormat(format));
        self.state.lock().accepted = Some(format);
        Ok(())
    }

    fn supported_rates(&self) -> Vec<i64> {
        self.rates.clone()
    }

    fn supported_encodings(&self) -> Vec<Encoding> {
        self.encodings.clone()
    }

    fn format_support(&self, rate: i64, encoding: Encoding) -> u8 {
        if !self.rates.contains(&rate) || !self.encodings.contains(&encoding) {
            return 0;
        }
        if self.stereo_only {
            CHANNELS_STEREO
        } else {
            CHANNELS_MONO | CHANNELS_STEREO
        }
    }

    fn seek(&self, offset: i64, whence: Whence) -> BackendResult<i64> {
        self.record(Call::Seek(offset, whence));
        if self.fail_seek {
            return Err(BackendError::Failed("seek failed".to_string()));
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let target = match whence {
            Whence::Set => offset,
            Whence::Current => state.position + offset,
            Whence::End => state.length.ok_or(BackendError::Unsupported("unknown length".to_string()))? + offset,
        };
        state.position = target.max(0);
        if let (Some(length), Some(left)) = (state.length, state.frames_left.as_mut()) {
            *left = ((length - state.position).max(0) / FRAME_SAMPLES) as usize;
        }
        Ok(state.position)
    }

    fn tell(&self) -> BackendResult<i64> {
        Ok(self.state.lock().position)
    }

    fn length(&self) -> Option<i64> {
        self.state.lock().length
    }

    fn open_output(&self, driver: &str, _device: Option<&str>) -> BackendResult<()> {
        self.record(Call::OpenOutput(driver.to_string()));
        self.state.lock().output_open = true;
        Ok(())
    }

    fn start_output(&self, format: FormatDescriptor) -> BackendResult<()> {
        self.record(Call::StartOutput(format));
        if !self.state.lock().output_open {
            return Err(BackendError::NotOpen);
        }
        Ok(())
    }

    fn write_output(&self, data: &[u8]) -> BackendResult<usize> {
        let len = self.max_write.map_or(data.len(), |max| data.len().min(max));
        self.record(Call::WriteStart(len));
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.record(Call::WriteEnd(len));
        Ok(len)
    }

    fn drop_buffered_output(&self) {
        self.record(Call::DropBuffered);
    }

    fn stop_output(&self) {
        self.record(Call::StopOutput);
    }

    fn close_output(&self) {
        self.record(Call::CloseOutput);
        self.state.lock().output_open = false;
    }

    fn set_volume(&self, base: f64) -> BackendResult<()> {
        self.record(Call::SetVolume(base));
        self.state.lock().volume = base;
        Ok(())
    }

    fn get_volume(&self) -> VolumeInfo {
        let volume = self.state.lock().volume;
        VolumeInfo {
            base: volume,
            actual: volume,
            rva_db: 0.0,
        }
    }

    fn set_eq_band(&self, group: ChannelGroup, band: usize, factor: f64) -> BackendResult<()> {
        self.record(Call::SetEq(group, band, factor));
        let mut state = self.state.lock();
        match group {
            ChannelGroup::Left => state.eq[0][band] = factor,
            ChannelGroup::Right => state.eq[1][band] = factor,
            ChannelGroup::Both => {
                state.eq[0][band] = factor;
                state.eq[1][band] = factor;
            }
        }
        Ok(())
    }

    fn get_eq_band(&self, group: ChannelGroup, band: usize) -> f64 {
        let state = self.state.lock();
        match group {
            ChannelGroup::Left => state.eq[0][band],
            ChannelGroup::Right => state.eq[1][band],
            ChannelGroup::Both => (state.eq[0][band] + state.eq[1][band]) / 2.0,
        }
    }

    fn reset_eq(&self) {
        self.record(Call::ResetEq);
        self.state.lock().eq = [[1.0; EQ_BANDS]; 2];
    }
}

