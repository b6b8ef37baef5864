//! System audio output through cpal
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread for the
//! duration of one start/stop cycle. PCM crosses over through a lock-free
//! ring buffer of f32 samples; the device callback zero-fills on underrun.
//!
//! Dropping buffered audio publishes a watermark (total samples written so
//! far) rather than clearing the ring, so samples pushed after the drop are
//! never lost to a late flush.

use super::output::OutputDriver;
use crate::backend::{BackendError, BackendResult};
use crate::format::{Encoding, FormatDescriptor};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ring capacity in seconds of audio
const RING_SECONDS: f64 = 0.5;

/// Back-off while the ring is full
const FULL_RING_WAIT: Duration = Duration::from_millis(5);

/// Callback-side read position against the discard watermark
struct PlayoutCursor {
    read_total: u64,
    discard_until: Arc<AtomicU64>,
}

impl PlayoutCursor {
    fn new(discard_until: Arc<AtomicU64>) -> Self {
        Self {
            read_total: 0,
            discard_until,
        }
    }

    fn fill<C: Consumer<Item = f32>>(&mut self, consumer: &mut C, data: &mut [f32]) {
        let target = self.discard_until.load(Ordering::Acquire);
        if target > self.read_total {
            let behind = usize::try_from(target - self.read_total).unwrap_or(usize::MAX);
            self.read_total += consumer.skip(behind) as u64;
        }
        let read = consumer.pop_slice(data);
        self.read_total += read as u64;
        data[read..].fill(0.0);
    }
}

struct StreamThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct CpalOutput {
    device_name: Option<String>,
    producer: Option<HeapProd<f32>>,
    written_total: u64,
    discard_until: Arc<AtomicU64>,
    stream: Option<StreamThread>,
    format: Option<FormatDescriptor>,
}

fn find_device(name: Option<&str>) -> BackendResult<Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| BackendError::Failed(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| BackendError::Failed(format!("Audio device '{}' not found", name))),
        None => host
            .default_output_device()
            .ok_or_else(|| BackendError::Failed("No default output device found".to_string())),
    }
}

impl CpalOutput {
    /// Check the device exists; the stream itself is built on `start`
    pub fn open(device_name: Option<&str>) -> BackendResult<Self> {
        let device = find_device(device_name)?;
        info!(
            "Opened audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(Self {
            device_name: device_name.map(str::to_string),
            producer: None,
            written_total: 0,
            discard_until: Arc::new(AtomicU64::new(0)),
            stream: None,
            format: None,
        })
    }

    fn shutdown_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.stop_tx.send(());
            if stream.handle.join().is_err() {
                warn!("Audio stream thread panicked");
            }
        }
        self.producer = None;
    }
}

impl OutputDriver for CpalOutput {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn start(&mut self, format: FormatDescriptor) -> BackendResult<()> {
        self.shutdown_stream();

        let channels = format.channels as usize;
        let capacity = ((format.rate as f64 * RING_SECONDS) as usize).max(1024) * channels.max(1);
        let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();

        let config = StreamConfig {
            channels: format.channels as u16,
            sample_rate: SampleRate(format.rate as u32),
            buffer_size: BufferSize::Default,
        };
        let device_name = self.device_name.clone();
        self.written_total = 0;
        self.discard_until = Arc::new(AtomicU64::new(0));
        let mut cursor = PlayoutCursor::new(Arc::clone(&self.discard_until));
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("mpr-cpal-output".to_string())
            .spawn(move || {
                let built = find_device(device_name.as_deref())
                    .map_err(|e| e.to_string())
                    .and_then(|device| {
                        device
                            .build_output_stream(
                                &config,
                                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                                    cursor.fill(&mut consumer, data)
                                },
                                move |err| error!("Audio stream error: {}", err),
                                None,
                            )
                            .map_err(|e| format!("Failed to build stream: {}", e))
                    })
                    .and_then(|stream| {
                        stream
                            .play()
                            .map_err(|e| format!("Failed to start stream: {}", e))
                            .map(|_| stream)
                    });

                match built {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let _ = stop_rx.recv();
                        drop(stream);
                        debug!("Audio stream closed");
                    }
                    Err(msg) => {
                        let _ = ready_tx.send(Err(msg));
                    }
                }
            })
            .map_err(BackendError::Io)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => {
                let _ = handle.join();
                return Err(BackendError::Failed(msg));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(BackendError::Failed("audio stream thread exited".to_string()));
            }
        }

        self.producer = Some(producer);
        self.stream = Some(StreamThread { stop_tx, handle });
        self.format = Some(format);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> BackendResult<usize> {
        let (Some(producer), Some(format)) = (self.producer.as_mut(), self.format) else {
            return Err(BackendError::NotOpen);
        };

        let samples: Vec<f32> = match format.encoding {
            Encoding::FLOAT_32 => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            _ => data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                .collect(),
        };

        let mut pending = samples.as_slice();
        while !pending.is_empty() {
            if self.stream.is_none() {
                return Err(BackendError::NotOpen);
            }
            if producer.is_full() {
                std::thread::sleep(FULL_RING_WAIT);
                continue;
            }
            let pushed = producer.push_slice(pending);
            self.written_total += pushed as u64;
            pending = &pending[pushed..];
        }
        Ok(data.len())
    }

    fn drop_buffered(&mut self) {
        self.discard_until.store(self.written_total, Ordering::Release);
    }

    fn stop(&mut self) {
        self.shutdown_stream();
        self.format = None;
    }

    fn close(&mut self) -> BackendResult<()> {
        self.stop();
        Ok(())
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.shutdown_stream();
    }
}
