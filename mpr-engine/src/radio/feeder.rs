//! Radio feed cycle
//!
//! Each cycle reads one metadata interval of audio from the live stream,
//! then the length-prefixed metadata block that follows it, and pushes the
//! audio into the decoder's feed input.

use super::icy::{self, IcyMetadata, METADATA_LENGTH_UNIT};
use crate::error::{Error, Result};
use crate::session::MediaSession;
use std::io::{ErrorKind, Read};
use tracing::{debug, info, trace};

/// Per-connection framing state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioFrameCursor {
    /// Audio bytes between metadata blocks (`icy-metaint`)
    pub meta_interval: usize,
    /// Raw text of the last non-empty metadata block
    pub icy_metadata_text: String,
}

impl RadioFrameCursor {
    pub fn new(meta_interval: usize) -> Self {
        Self {
            meta_interval,
            icy_metadata_text: String::new(),
        }
    }
}

/// What one feed cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Audio bytes handed to the decoder
    pub audio_bytes: usize,
    /// Present when the station metadata changed during this cycle
    pub metadata: Option<IcyMetadata>,
}

/// Run one feed cycle.
///
/// Returns `Ok(None)` without touching anything when the session is closed
/// or not a radio station. End of stream and read failures are radio errors;
/// a decoder rejecting the bytes is a feed error.
pub fn feed(session: &MediaSession) -> Result<Option<FeedOutcome>> {
    if !session.is_open() || !session.is_radio_station() {
        return Ok(None);
    }

    let mut guard = session.radio_link();
    let Some(link) = guard.as_mut() else {
        return Ok(None);
    };

    let interval = link.cursor.meta_interval;
    if interval == 0 {
        let mut chunk = vec![0u8; link.chunk_size];
        let read = read_some(&mut link.reader, &mut chunk)?;
        session
            .backend()
            .feed(&chunk[..read])
            .map_err(|e| Error::Feed(e.to_string()))?;
        trace!("Fed {} bytes (no metadata framing)", read);
        return Ok(Some(FeedOutcome {
            audio_bytes: read,
            metadata: None,
        }));
    }

    let mut audio = vec![0u8; interval];
    read_exact(&mut link.reader, &mut audio)?;

    let mut length_byte = [0u8; 1];
    read_exact(&mut link.reader, &mut length_byte)?;
    let block_len = length_byte[0] as usize * METADATA_LENGTH_UNIT;

    let mut changed = None;
    if block_len > 0 {
        let mut block = vec![0u8; block_len];
        read_exact(&mut link.reader, &mut block)?;
        let metadata = icy::parse_metadata_block(&block);

        if !metadata.raw.is_empty() && metadata.raw != link.cursor.icy_metadata_text {
            if metadata.title.is_empty() {
                debug!("Unrecognized ICY metadata: {}", metadata.raw);
            } else {
                info!("Now playing: {}", metadata.title);
            }
            link.cursor.icy_metadata_text = metadata.raw.clone();
            session.set_now_playing(metadata.clone());
            changed = Some(metadata);
        }
    }

    session
        .backend()
        .feed(&audio)
        .map_err(|e| Error::Feed(e.to_string()))?;
    trace!("Fed {} bytes, metadata block {} bytes", interval, block_len);

    Ok(Some(FeedOutcome {
        audio_bytes: interval,
        metadata: changed,
    }))
}

/// Fill `buf` completely, looping over partial reads
fn read_exact(reader: &mut (impl Read + ?Sized), buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::RadioStream(format!(
                    "stream ended after {} of {} bytes",
                    filled,
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::RadioStream(format!("stream read failed: {}", e))),
        }
    }
    Ok(())
}

/// Read at least one byte
fn read_some(reader: &mut (impl Read + ?Sized), buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(0) => return Err(Error::RadioStream("stream ended".to_string())),
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::RadioStream(format!("stream read failed: {}", e))),
        }
    }
}
