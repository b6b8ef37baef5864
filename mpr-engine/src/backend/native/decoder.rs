//! Symphonia decoders for the native backend
//!
//! [`FileDecoder`] pulls packets from a probed container. [`FeedDecoder`]
//! receives raw MPEG bytes pushed by the radio feeder and splits them into
//! Layer III frames itself.

use super::mpeg_frame::{self, FrameHeader, HEADER_LEN};
use crate::backend::{BackendError, BackendResult};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Upper bound on undecoded feed input
pub const MAX_FEED_BUFFER: usize = 1024 * 1024;

/// Rate and channel count of decoded PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub rate: u32,
    pub channels: usize,
}

/// Interleaved f32 PCM from one decoded packet
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub spec: StreamSpec,
    pub samples: Vec<f32>,
}

impl PcmChunk {
    pub fn frames(&self) -> u64 {
        if self.spec.channels == 0 {
            0
        } else {
            (self.samples.len() / self.spec.channels) as u64
        }
    }
}

/// Outcome of asking a decoder for its next chunk
#[derive(Debug)]
pub enum ChunkResult {
    Chunk(PcmChunk),
    NeedMore,
    Done,
    Error(String),
}

fn to_chunk(decoded: AudioBufferRef<'_>) -> Option<PcmChunk> {
    let spec = *decoded.spec();
    if decoded.frames() == 0 {
        return None;
    }
    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    buffer.copy_interleaved_ref(decoded);
    Some(PcmChunk {
        spec: StreamSpec {
            rate: spec.rate,
            channels: spec.channels.count(),
        },
        samples: buffer.samples().to_vec(),
    })
}

/// Pull decoder over a local file
pub struct FileDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: StreamSpec,
    n_frames: Option<u64>,
    /// Sample frames delivered so far
    position: u64,
    /// Frames before this timestamp are dropped after an accurate seek
    seek_target: Option<u64>,
}

impl FileDecoder {
    pub fn open(path: &Path) -> BackendResult<Self> {
        debug!("Opening file decoder: {}", path.display());
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| BackendError::Unsupported(format!("Failed to probe format: {}", e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| BackendError::Unsupported("No audio track found".to_string()))?;

        let params = &track.codec_params;
        let rate = params
            .sample_rate
            .ok_or_else(|| BackendError::Unsupported("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| BackendError::Unsupported("Channel count not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| BackendError::Unsupported(format!("Failed to create decoder: {}", e)))?;

        let track_id = track.id;
        let n_frames = params.n_frames;
        debug!(
            "File format: sample_rate={}, channels={}, frames={:?}",
            rate, channels, n_frames
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            spec: StreamSpec { rate, channels },
            n_frames,
            position: 0,
            seek_target: None,
        })
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn length(&self) -> Option<u64> {
        self.n_frames
    }

    pub fn next_chunk(&mut self) -> ChunkResult {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of file");
                    return ChunkResult::Done;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return ChunkResult::Error(format!("Error reading packet: {}", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let packet_ts = packet.ts();
            let mut chunk = match self.decoder.decode(&packet) {
                Ok(decoded) => match to_chunk(decoded) {
                    Some(chunk) => chunk,
                    None => continue,
                },
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return ChunkResult::Error(format!("Decoder failure: {}", e)),
            };

            let frames = chunk.frames();
            if let Some(target) = self.seek_target {
                if packet_ts + frames <= target {
                    continue;
                }
                let skip = target.saturating_sub(packet_ts) as usize * chunk.spec.channels;
                chunk.samples.drain(..skip.min(chunk.samples.len()));
                self.seek_target = None;
            }

            self.spec = chunk.spec;
            self.position = packet_ts + frames;
            return ChunkResult::Chunk(chunk);
        }
    }

    /// Accurate seek to a sample frame offset
    pub fn seek(&mut self, frame: u64) -> BackendResult<u64> {
        let target = match self.n_frames {
            Some(total) => frame.min(total),
            None => frame,
        };
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: target,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| BackendError::Failed(format!("seek to {}: {}", target, e)))?;

        self.decoder.reset();
        self.seek_target = Some(seeked.required_ts);
        self.position = seeked.required_ts;
        Ok(self.position)
    }
}

/// Push decoder for a live MPEG stream
pub struct FeedDecoder {
    input: Vec<u8>,
    decoder: Option<Box<dyn Decoder>>,
    /// Format of the frame the codec was built for
    codec_spec: Option<StreamSpec>,
    position: u64,
}

impl Default for FeedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedDecoder {
    pub fn new() -> Self {
        Self {
            input: Vec::new(),
            decoder: None,
            codec_spec: None,
            position: 0,
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> BackendResult<()> {
        if self.input.len() + data.len() > MAX_FEED_BUFFER {
            return Err(BackendError::Failed(format!(
                "feed buffer full ({} bytes pending)",
                self.input.len()
            )));
        }
        self.input.extend_from_slice(data);
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Format of the next frame in the input, else of the last decoded one
    pub fn spec(&self) -> Option<StreamSpec> {
        mpeg_frame::find_sync(&self.input)
            .and_then(|offset| FrameHeader::parse(&self.input[offset..]))
            .map(|header| StreamSpec {
                rate: header.sample_rate,
                channels: header.channels as usize,
            })
            .or(self.codec_spec)
    }

    fn make_decoder(spec: StreamSpec) -> BackendResult<Box<dyn Decoder>> {
        let mut params = CodecParameters::new();
        params.for_codec(CODEC_TYPE_MP3).with_sample_rate(spec.rate);
        symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| BackendError::Unsupported(format!("Failed to create MP3 decoder: {}", e)))
    }

    pub fn next_chunk(&mut self) -> ChunkResult {
        loop {
            let Some(offset) = mpeg_frame::find_sync(&self.input) else {
                // Keep a possible partial header
                let keep = self.input.len().min(HEADER_LEN - 1);
                self.input.drain(..self.input.len() - keep);
                return ChunkResult::NeedMore;
            };
            if offset > 0 {
                debug!("Skipping {} bytes to next frame sync", offset);
                self.input.drain(..offset);
            }

            let Some(header) = FrameHeader::parse(&self.input) else {
                return ChunkResult::NeedMore;
            };
            let frame_len = header.frame_len();
            if self.input.len() < frame_len {
                return ChunkResult::NeedMore;
            }

            // A real frame is followed by another header; otherwise this was a false sync
            if self.input.len() >= frame_len + HEADER_LEN
                && FrameHeader::parse(&self.input[frame_len..]).is_none()
            {
                self.input.drain(..1);
                continue;
            }

            let frame: Vec<u8> = self.input.drain(..frame_len).collect();
            let spec = StreamSpec {
                rate: header.sample_rate,
                channels: header.channels as usize,
            };

            if self.decoder.is_none() || self.codec_spec != Some(spec) {
                match Self::make_decoder(spec) {
                    Ok(decoder) => self.decoder = Some(decoder),
                    Err(e) => return ChunkResult::Error(e.to_string()),
                }
                self.codec_spec = Some(spec);
            }
            let Some(decoder) = self.decoder.as_mut() else {
                return ChunkResult::Error("decoder unavailable".to_string());
            };

            let packet = Packet::new_from_slice(0, self.position, header.samples_per_frame() as u64, &frame);
            match decoder.decode(&packet) {
                Ok(decoded) => {
                    if let Some(chunk) = to_chunk(decoded) {
                        self.position += chunk.frames();
                        return ChunkResult::Chunk(chunk);
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Expected right after joining a stream (bit reservoir not primed)
                    debug!("Skipping undecodable frame: {}", e);
                }
                Err(e) => return ChunkResult::Error(format!("Decoder failure: {}", e)),
            }
        }
    }
}
