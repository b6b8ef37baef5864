//! Decoder/output backend contract
//!
//! The engine drives playback exclusively through [`Backend`]. One backend
//! instance serves one media session: it owns the decoder context, the
//! output device and the volume/equalizer parameters. Methods take `&self`
//! so the decode loop and caller threads can share an `Arc<dyn Backend>`;
//! implementations serialize internally.

pub mod native;

use crate::format::{Encoding, FormatDescriptor};
use std::path::Path;
use thiserror::Error;

pub use native::NativeBackend;

/// Number of equalizer bands a backend exposes
pub const EQ_BANDS: usize = 32;

/// Status reported with every decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Frame decoded, `data` holds PCM in the accepted format
    Ok,
    /// Stream format changed; re-query and renegotiate before continuing
    NewFormat,
    /// Feed decoder ran out of input
    NeedMore,
    /// End of stream
    Done,
    /// Any other decoder condition
    Error(String),
}

/// One `decode_frame` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub status: DecodeStatus,
    pub data: Vec<u8>,
}

impl DecodedFrame {
    pub fn ok(data: Vec<u8>) -> Self {
        Self { status: DecodeStatus::Ok, data }
    }

    pub fn status(status: DecodeStatus) -> Self {
        Self { status, data: Vec::new() }
    }
}

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

/// Equalizer channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelGroup {
    Left,
    Right,
    Both,
}

/// Volume as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeInfo {
    /// Linear volume set by the caller
    pub base: f64,
    /// Volume after the relative volume adjustment
    pub actual: f64,
    /// Relative volume adjustment in decibels
    pub rva_db: f64,
}

/// Backend failure
#[derive(Error, Debug)]
pub enum BackendError {
    /// Not enough input yet (feed decoders)
    #[error("need more input")]
    NeedMore,

    /// No media or output open
    #[error("not open")]
    NotOpen,

    /// Parameter or format the backend does not handle
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Decode/output backend driven by the playback engine
pub trait Backend: Send + Sync {
    /// Open a local file for pull-based decoding
    fn open_file(&self, path: &Path) -> BackendResult<()>;

    /// Open the decoder in feed mode (radio)
    fn open_feed(&self) -> BackendResult<()>;

    /// Release the decoder context
    fn close(&self);

    /// Decode the next frame
    fn decode_frame(&self) -> DecodedFrame;

    /// Append raw stream bytes to the feed decoder's input
    fn feed(&self, data: &[u8]) -> BackendResult<()>;

    /// Current stream format as the decoder would produce it
    fn get_format(&self) -> BackendResult<FormatDescriptor>;

    /// Forget every accepted output format
    fn clear_format(&self);

    /// Accept `format` as the decoder's output format
    fn set_format(&self, format: FormatDescriptor) -> BackendResult<()>;

    fn supported_rates(&self) -> Vec<i64>;

    fn supported_encodings(&self) -> Vec<Encoding>;

    /// Channel mask (`CHANNELS_MONO | CHANNELS_STEREO`) supported for a rate/encoding
    fn format_support(&self, rate: i64, encoding: Encoding) -> u8;

    /// Reposition the decoder; returns the new offset in samples
    fn seek(&self, offset: i64, whence: Whence) -> BackendResult<i64>;

    /// Current decode offset in samples
    fn tell(&self) -> BackendResult<i64>;

    /// Total length in samples when known
    fn length(&self) -> Option<i64>;

    fn open_output(&self, driver: &str, device: Option<&str>) -> BackendResult<()>;

    fn start_output(&self, format: FormatDescriptor) -> BackendResult<()>;

    /// Write PCM to the output device; returns bytes accepted
    fn write_output(&self, data: &[u8]) -> BackendResult<usize>;

    /// Discard audio queued in the output device
    fn drop_buffered_output(&self);

    fn stop_output(&self);

    fn close_output(&self);

    /// Set the linear base volume
    fn set_volume(&self, base: f64) -> BackendResult<()>;

    fn get_volume(&self) -> VolumeInfo;

    fn set_eq_band(&self, group: ChannelGroup, band: usize, factor: f64) -> BackendResult<()>;

    /// Band factor; for `Both` the mean of left and right
    fn get_eq_band(&self, group: ChannelGroup, band: usize) -> f64;

    /// Return every band to neutral (factor 1.0)
    fn reset_eq(&self);
}
