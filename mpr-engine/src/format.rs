//! Sample format types shared by the engine, the probe and backends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Channel-count bit for mono in a format support mask
pub const CHANNELS_MONO: u8 = 0x1;
/// Channel-count bit for stereo in a format support mask
pub const CHANNELS_STEREO: u8 = 0x2;

/// Sample rates an MPEG audio stream can carry (MPEG 1, 2 and 2.5)
pub const MPEG_RATES: [i64; 9] = [8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000];

/// Output sample encoding, identified by the backend's numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Encoding(pub u32);

impl Encoding {
    /// Signed 16-bit little-endian integer samples
    pub const SIGNED_16: Encoding = Encoding(0xD0);
    /// 32-bit little-endian float samples
    pub const FLOAT_32: Encoding = Encoding(0x200);

    /// Size of one sample in bytes, `None` for codes this crate cannot render
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Encoding::SIGNED_16 => Some(2),
            Encoding::FLOAT_32 => Some(4),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::SIGNED_16 => "s16",
            Encoding::FLOAT_32 => "f32",
            _ => "unknown",
        }
    }

    /// Parse a config-file encoding name
    pub fn from_name(name: &str) -> Option<Encoding> {
        match name.trim().to_ascii_lowercase().as_str() {
            "s16" | "signed16" => Some(Encoding::SIGNED_16),
            "f32" | "float32" => Some(Encoding::FLOAT_32),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes_per_sample() {
            Some(_) => write!(f, "{}", self.name()),
            None => write!(f, "0x{:x}", self.0),
        }
    }
}

/// Channel mask bit for a channel count (0 for counts no output accepts)
pub fn channel_mask(channels: u8) -> u8 {
    match channels {
        1 => CHANNELS_MONO,
        2 => CHANNELS_STEREO,
        _ => 0,
    }
}

/// Negotiated `(rate, channels, encoding)` for one play cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub rate: i64,
    pub channels: u8,
    pub encoding: Encoding,
}

impl FormatDescriptor {
    pub fn new(rate: i64, channels: u8, encoding: Encoding) -> Self {
        Self { rate, channels, encoding }
    }

    /// Bytes in one interleaved sample frame (all channels)
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.encoding.bytes_per_sample().unwrap_or(0)
    }

    /// Duration of `samples` sample frames at this rate
    pub fn samples_to_duration(&self, samples: i64) -> Duration {
        if self.rate <= 0 || samples <= 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(samples as f64 / self.rate as f64)
    }

    /// Sample offset of a position given in seconds, rounded to the nearest sample
    pub fn seconds_to_samples(&self, seconds: f64) -> i64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.rate as f64).round() as i64
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, {}", self.rate, self.channels, self.encoding)
    }
}
