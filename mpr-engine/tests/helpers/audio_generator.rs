//! Audio Test File Generation Utilities
//!
//! Deterministic WAV fixtures with known length and amplitude, used to check
//! that the native backend decodes, positions and renders what it was given.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Generate a stereo 16-bit sine WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Sine frequency (e.g. 440.0)
/// * `amplitude` - Peak amplitude 0.0-1.0
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;

    for n in 0..total_frames {
        let t = n as f32 / TEST_SAMPLE_RATE as f32;
        let sample = (amplitude * (2.0 * PI * frequency_hz * t).sin() * i16::MAX as f32) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a 16-bit WAV with `channels` channels; the sine is written to
/// the first two channels and the rest stay silent
pub fn generate_multichannel_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    channels: u16,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;

    for n in 0..total_frames {
        let t = n as f32 / TEST_SAMPLE_RATE as f32;
        let sample = (amplitude * (2.0 * PI * frequency_hz * t).sin() * i16::MAX as f32) as i16;
        for ch in 0..channels {
            writer.write_sample(if ch < 2 { sample } else { 0 })?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Frames in a WAV file written by `generate_sine_wav` or the wav driver
pub fn wav_frames<P: AsRef<Path>>(path: P) -> Result<u32, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    Ok(reader.duration())
}

/// Peak absolute 16-bit sample value in a WAV file
pub fn wav_peak<P: AsRef<Path>>(path: P) -> Result<i32, hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let mut peak = 0i32;
    for sample in reader.samples::<i16>() {
        peak = peak.max((sample? as i32).abs());
    }
    Ok(peak)
}
