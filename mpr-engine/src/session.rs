//! Media session: one opened audio source and everything that belongs to it
//!
//! A session owns its backend handle, its output-open flag, the negotiated
//! format, the radio stream (for stations) and its [`Transport`]. Nothing is
//! global; several sessions can exist side by side, each with its own
//! backend.

use crate::backend::Backend;
use crate::config::RadioConfig;
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::radio::{self, IcyHeaders, IcyMetadata, RadioFrameCursor};
use crate::transport::Transport;
use mpr_common::{EndReason, PlaybackState};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes per feed cycle for stations without ICY metadata, unless configured
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Where a session's audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    File(PathBuf),
    Radio(String),
}

impl std::fmt::Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaSource::File(path) => write!(f, "{}", path.display()),
            MediaSource::Radio(url) => write!(f, "{}", url),
        }
    }
}

/// Live stream state of a radio session
pub struct RadioLink {
    pub headers: IcyHeaders,
    pub reader: Box<dyn Read + Send>,
    pub cursor: RadioFrameCursor,
    /// Read size when the station sends no metadata
    pub chunk_size: usize,
}

pub struct MediaSession {
    source: MediaSource,
    backend: Arc<dyn Backend>,
    is_open: AtomicBool,
    output_open: AtomicBool,
    is_radio_station: bool,
    station: Option<IcyHeaders>,
    format: Mutex<Option<FormatDescriptor>>,
    radio: Mutex<Option<RadioLink>>,
    now_playing: Mutex<Option<IcyMetadata>>,
    last_end: Mutex<Option<EndReason>>,
    transport: Transport,
}

impl MediaSession {
    fn new(source: MediaSource, backend: Arc<dyn Backend>, radio: Option<RadioLink>) -> Self {
        Self {
            source,
            backend,
            is_open: AtomicBool::new(true),
            output_open: AtomicBool::new(false),
            is_radio_station: radio.is_some(),
            station: radio.as_ref().map(|link| link.headers.clone()),
            format: Mutex::new(None),
            radio: Mutex::new(radio),
            now_playing: Mutex::new(None),
            last_end: Mutex::new(None),
            transport: Transport::new(),
        }
    }

    /// Open a local file through `backend`
    pub fn open_file(path: impl AsRef<Path>, backend: Arc<dyn Backend>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        backend
            .open_file(path)
            .map_err(|e| Error::Playback(format!("Failed to open {}: {}", path.display(), e)))?;
        info!("Opened file session: {}", path.display());
        Ok(Arc::new(Self::new(MediaSource::File(path.to_path_buf()), backend, None)))
    }

    /// Connect to a radio station and open the backend in feed mode
    pub fn open_radio(url: &str, backend: Arc<dyn Backend>, config: &RadioConfig) -> Result<Arc<Self>> {
        let connection = radio::stream::connect(url, config)?;
        let session = Self::open_radio_stream(url, &connection.headers, connection.reader, backend)?;
        if let Some(link) = session.radio.lock().as_mut() {
            link.chunk_size = config.chunk_size;
        }
        Ok(session)
    }

    /// Open a radio session over an already-connected stream
    pub fn open_radio_stream(
        url: &str,
        headers: &HashMap<String, String>,
        reader: Box<dyn Read + Send>,
        backend: Arc<dyn Backend>,
    ) -> Result<Arc<Self>> {
        let headers = IcyHeaders::from_map(headers);
        backend
            .open_feed()
            .map_err(|e| Error::RadioStream(format!("Failed to open feed decoder: {}", e)))?;

        if headers.metaint == 0 {
            warn!("Station sends no icy-metaint; metadata disabled");
        }
        info!(
            "Opened radio session: {} ({}, metaint={})",
            url,
            headers.name.as_deref().unwrap_or("unnamed station"),
            headers.metaint
        );

        let link = RadioLink {
            cursor: RadioFrameCursor::new(headers.metaint),
            headers,
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
        };
        Ok(Arc::new(Self::new(MediaSource::Radio(url.to_string()), backend, Some(link))))
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub fn is_output_open(&self) -> bool {
        self.output_open.load(Ordering::Acquire)
    }

    /// Output flag; never set on a closed session
    pub(crate) fn set_output_open(&self, open: bool) {
        self.output_open
            .store(open && self.is_open(), Ordering::Release);
    }

    pub fn is_radio_station(&self) -> bool {
        self.is_radio_station
    }

    /// Station headers of a radio session
    pub fn station(&self) -> Option<&IcyHeaders> {
        self.station.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.transport.state()
    }

    /// Format negotiated for the current play cycle
    pub fn current_format(&self) -> Option<FormatDescriptor> {
        *self.format.lock()
    }

    pub(crate) fn set_current_format(&self, format: Option<FormatDescriptor>) {
        *self.format.lock() = format;
    }

    /// Latest station metadata
    pub fn icy_metadata(&self) -> Option<IcyMetadata> {
        self.now_playing.lock().clone()
    }

    /// "Now playing" title; empty when the station sent nothing parseable
    pub fn now_playing(&self) -> String {
        self.now_playing
            .lock()
            .as_ref()
            .map(|meta| meta.title.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_now_playing(&self, metadata: IcyMetadata) {
        *self.now_playing.lock() = Some(metadata);
    }

    pub(crate) fn radio_link(&self) -> MutexGuard<'_, Option<RadioLink>> {
        self.radio.lock()
    }

    /// Why the most recent decode loop ended
    pub fn last_end(&self) -> Option<EndReason> {
        self.last_end.lock().clone()
    }

    /// Failure reason of the most recent decode loop, if it failed
    pub fn last_error(&self) -> Option<EndReason> {
        self.last_end().filter(EndReason::is_failure)
    }

    pub(crate) fn set_last_end(&self, reason: EndReason) {
        *self.last_end.lock() = Some(reason);
    }

    /// Stop playback, close the output and release the decoder.
    ///
    /// Closing an already closed session does nothing.
    pub fn close(&self) {
        let _control = self.transport.control();
        if !self.is_open() {
            return;
        }

        let prior = self.transport.shutdown();
        debug!("Closing session {} (was {})", self.source, prior);

        if self.is_output_open() {
            self.backend.stop_output();
            self.backend.close_output();
            self.output_open.store(false, Ordering::Release);
        }

        self.is_open.store(false, Ordering::Release);
        self.backend.close();
        *self.radio.lock() = None;
        *self.format.lock() = None;
        info!("Closed session {}", self.source);
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}
