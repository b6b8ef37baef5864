//! Output drivers for the native backend
//!
//! A driver receives PCM already rendered in the accepted format. Drivers are
//! chosen by name when the output is opened:
//! - `null`: discards audio at real-time pace
//! - `discard`: discards audio as fast as it arrives
//! - `wav`: writes a WAV file at the device path
//! - `cpal`: system audio device (`cpal-output` feature)

use crate::backend::{BackendError, BackendResult};
use crate::format::{Encoding, FormatDescriptor};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Audio the null driver pretends to have queued ahead of real time
const NULL_DEVICE_LEAD: Duration = Duration::from_millis(50);

/// One opened output device
pub trait OutputDriver: Send {
    fn name(&self) -> &'static str;

    /// Begin a stream in `format`
    fn start(&mut self, format: FormatDescriptor) -> BackendResult<()>;

    /// Consume PCM; returns bytes accepted
    fn write(&mut self, data: &[u8]) -> BackendResult<usize>;

    /// Discard queued audio
    fn drop_buffered(&mut self) {}

    fn stop(&mut self) {}

    /// Release the device; the driver is not used again
    fn close(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// Driver names `open_driver` accepts
pub fn driver_names() -> Vec<&'static str> {
    let mut names = vec!["null", "discard", "wav"];
    if cfg!(feature = "cpal-output") {
        names.push("cpal");
    }
    names
}

/// Open the driver registered under `name`
pub fn open_driver(name: &str, device: Option<&str>) -> BackendResult<Box<dyn OutputDriver>> {
    match name {
        "null" => Ok(Box::new(NullOutput::new(true))),
        "discard" => Ok(Box::new(NullOutput::new(false))),
        "wav" => {
            let path = device.ok_or_else(|| {
                BackendError::Failed("wav driver needs a device path".to_string())
            })?;
            Ok(Box::new(WavOutput::new(PathBuf::from(path))))
        }
        #[cfg(feature = "cpal-output")]
        "cpal" => Ok(Box::new(super::cpal_output::CpalOutput::open(device)?)),
        other => Err(BackendError::Unsupported(format!("output driver '{}'", other))),
    }
}

/// Driver that drops audio, optionally at the pace a real device would
pub struct NullOutput {
    paced: bool,
    format: Option<FormatDescriptor>,
    clock_start: Option<Instant>,
    frames_written: u64,
}

impl NullOutput {
    pub fn new(paced: bool) -> Self {
        Self {
            paced,
            format: None,
            clock_start: None,
            frames_written: 0,
        }
    }

    fn reset_clock(&mut self) {
        self.clock_start = Some(Instant::now());
        self.frames_written = 0;
    }
}

impl OutputDriver for NullOutput {
    fn name(&self) -> &'static str {
        if self.paced {
            "null"
        } else {
            "discard"
        }
    }

    fn start(&mut self, format: FormatDescriptor) -> BackendResult<()> {
        self.format = Some(format);
        self.reset_clock();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> BackendResult<usize> {
        let Some(format) = self.format else {
            return Err(BackendError::NotOpen);
        };
        if !self.paced || format.rate <= 0 || format.frame_bytes() == 0 {
            return Ok(data.len());
        }

        self.frames_written += (data.len() / format.frame_bytes()) as u64;
        let played = Duration::from_secs_f64(self.frames_written as f64 / format.rate as f64);
        let start = *self.clock_start.get_or_insert_with(Instant::now);
        let elapsed = start.elapsed();
        if played > elapsed + NULL_DEVICE_LEAD {
            std::thread::sleep(played - elapsed - NULL_DEVICE_LEAD);
        }
        Ok(data.len())
    }

    fn drop_buffered(&mut self) {
        self.reset_clock();
    }

    fn stop(&mut self) {
        self.clock_start = None;
    }
}

/// Driver writing the stream to a WAV file.
///
/// The file stays open across stop/start so one play session produces one
/// file; a start with a different format finalizes it and starts over.
pub struct WavOutput {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    format: Option<FormatDescriptor>,
}

impl WavOutput {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            format: None,
        }
    }

    fn spec_for(format: FormatDescriptor) -> BackendResult<WavSpec> {
        let (bits_per_sample, sample_format) = match format.encoding {
            Encoding::SIGNED_16 => (16, SampleFormat::Int),
            Encoding::FLOAT_32 => (32, SampleFormat::Float),
            other => return Err(BackendError::Unsupported(format!("wav encoding {}", other))),
        };
        Ok(WavSpec {
            channels: format.channels as u16,
            sample_rate: format.rate as u32,
            bits_per_sample,
            sample_format,
        })
    }

    fn finalize(&mut self) -> BackendResult<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| BackendError::Failed(format!("finalize {}: {}", self.path.display(), e)))?;
            debug!("Finalized {}", self.path.display());
        }
        Ok(())
    }
}

impl OutputDriver for WavOutput {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn start(&mut self, format: FormatDescriptor) -> BackendResult<()> {
        if self.writer.is_some() && self.format == Some(format) {
            return Ok(());
        }
        self.finalize()?;

        let spec = Self::spec_for(format)?;
        let writer = WavWriter::create(&self.path, spec)
            .map_err(|e| BackendError::Failed(format!("create {}: {}", self.path.display(), e)))?;
        info!("Writing {} to {}", format, self.path.display());
        self.writer = Some(writer);
        self.format = Some(format);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> BackendResult<usize> {
        let (Some(writer), Some(format)) = (self.writer.as_mut(), self.format) else {
            return Err(BackendError::NotOpen);
        };

        let result = match format.encoding {
            Encoding::FLOAT_32 => data
                .chunks_exact(4)
                .try_for_each(|b| writer.write_sample(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            _ => data
                .chunks_exact(2)
                .try_for_each(|b| writer.write_sample(i16::from_le_bytes([b[0], b[1]]))),
        };
        result.map_err(|e| BackendError::Failed(format!("wav write: {}", e)))?;
        Ok(data.len())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.format = None;
        self.finalize()
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_driver_rejected() {
        assert!(matches!(open_driver("pulse9000", None), Err(BackendError::Unsupported(_))));
        assert!(matches!(open_driver("wav", None), Err(BackendError::Failed(_))));
    }

    #[test]
    fn test_discard_driver_needs_start() {
        let mut driver = NullOutput::new(false);
        assert!(matches!(driver.write(&[0; 4]), Err(BackendError::NotOpen)));
        driver
            .start(FormatDescriptor::new(44100, 2, Encoding::SIGNED_16))
            .unwrap();
        assert_eq!(driver.write(&[0; 64]).unwrap(), 64);
    }

    #[test]
    fn test_null_driver_paces_writes() {
        let mut driver = NullOutput::new(true);
        // 1000 Hz mono s16: 2 bytes per frame
        driver
            .start(FormatDescriptor::new(1000, 1, Encoding::SIGNED_16))
            .unwrap();
        let started = Instant::now();
        driver.write(&[0u8; 300]).unwrap(); // 150 ms of audio
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_wav_driver_keeps_file_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let format = FormatDescriptor::new(8000, 1, Encoding::SIGNED_16);

        let mut driver = WavOutput::new(path.clone());
        driver.start(format).unwrap();
        driver.write(&[1, 0, 2, 0]).unwrap();
        driver.stop();
        driver.start(format).unwrap();
        driver.write(&[3, 0]).unwrap();
        driver.close().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3]);
    }
}
