//! Format/capability probe over a session's backend

use crate::backend::BackendError;
use crate::error::{Error, Result};
use crate::format::{channel_mask, Encoding, FormatDescriptor};
use crate::session::MediaSession;
use tracing::debug;

/// One row of the capability table: a rate/encoding pair and its channel mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub rate: i64,
    pub encoding: Encoding,
    pub channels: u8,
}

pub fn supported_rates(session: &MediaSession) -> Vec<i64> {
    session.backend().supported_rates()
}

pub fn supported_encodings(session: &MediaSession) -> Vec<Encoding> {
    session.backend().supported_encodings()
}

/// Channel mask supported at `rate` with `encoding`
pub fn channel_support(session: &MediaSession, rate: i64, encoding: Encoding) -> u8 {
    session.backend().format_support(rate, encoding)
}

pub fn is_supported(session: &MediaSession, format: FormatDescriptor) -> bool {
    let mask = channel_mask(format.channels);
    mask != 0 && channel_support(session, format.rate, format.encoding) & mask != 0
}

/// Format the decoder currently produces for the open stream
pub fn current_format(session: &MediaSession) -> Result<FormatDescriptor> {
    if !session.is_open() {
        return Err(Error::SessionNotOpen);
    }
    session.backend().get_format().map_err(|e| match e {
        BackendError::NeedMore => Error::Negotiation("stream format not known yet".to_string()),
        other => Error::Negotiation(other.to_string()),
    })
}

/// Every supported rate/encoding combination with a non-empty channel mask
pub fn capabilities(session: &MediaSession) -> Vec<Capability> {
    let encodings = supported_encodings(session);
    supported_rates(session)
        .into_iter()
        .flat_map(|rate| {
            encodings.iter().map(move |&encoding| Capability {
                rate,
                encoding,
                channels: 0,
            })
        })
        .map(|cap| Capability {
            channels: channel_support(session, cap.rate, cap.encoding),
            ..cap
        })
        .filter(|cap| cap.channels != 0)
        .collect()
}

/// Output channel count for a stream decoded with `channels`: its own count
/// when an output layout exists for it, otherwise stereo (the backend folds
/// the extra channels down)
pub fn output_channels(channels: u8) -> u8 {
    if channel_mask(channels) != 0 {
        channels
    } else {
        2
    }
}

/// Pick the output encoding for a decoded `rate`/`channels`.
///
/// `preferred` wins when supported, then the backend's encodings in order.
pub fn choose_encoding(
    session: &MediaSession,
    rate: i64,
    channels: u8,
    preferred: Encoding,
) -> Result<Encoding> {
    let mask = channel_mask(channels);
    let chosen = std::iter::once(preferred)
        .chain(supported_encodings(session))
        .find(|&encoding| mask != 0 && channel_support(session, rate, encoding) & mask != 0);

    match chosen {
        Some(encoding) => {
            debug!("Chose {} for {} Hz, {} ch", encoding, rate, channels);
            Ok(encoding)
        }
        None => Err(Error::UnsupportedFormat {
            rate,
            channels,
            encoding: preferred,
        }),
    }
}
