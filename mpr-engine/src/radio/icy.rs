//! ICY (Shoutcast/Icecast) header and in-band metadata parsing

use std::collections::HashMap;

/// ICY metadata block lengths are sent in units of this many bytes
pub const METADATA_LENGTH_UNIT: usize = 16;

/// Station headers captured from the stream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyHeaders {
    /// Audio bytes between metadata blocks; 0 when the station sends none
    pub metaint: usize,
    pub name: Option<String>,
    pub genre: Option<String>,
    pub url: Option<String>,
    pub bitrate: Option<u32>,
    pub content_type: Option<String>,
}

impl IcyHeaders {
    /// Parse from a response header map; names match case-insensitively
    pub fn from_map(headers: &HashMap<String, String>) -> Self {
        let lookup = |key: &str| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            metaint: lookup("icy-metaint")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            name: lookup("icy-name"),
            genre: lookup("icy-genre"),
            url: lookup("icy-url"),
            bitrate: lookup("icy-br").and_then(|v| v.split(',').next().and_then(|b| b.trim().parse().ok())),
            content_type: lookup("content-type"),
        }
    }
}

/// One decoded metadata block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyMetadata {
    /// Block text with NUL padding removed, kept even when parsing fails
    pub raw: String,
    /// `StreamTitle` value, empty when the block has none
    pub title: String,
    pub url: Option<String>,
}

/// Decode a metadata block: UTF-8 (lossy), NUL padding stripped, trimmed
pub fn parse_metadata_block(block: &[u8]) -> IcyMetadata {
    let text = String::from_utf8_lossy(block);
    let raw = text.replace('\0', "").trim().to_string();
    let title = extract_field(&raw, "StreamTitle").unwrap_or_default();
    let url = extract_field(&raw, "StreamUrl").filter(|u| !u.is_empty());
    IcyMetadata { raw, title, url }
}

/// Value of `Key='...';` in a metadata string.
///
/// The value ends at the first `';`, so apostrophes inside titles survive.
pub fn extract_field(raw: &str, key: &str) -> Option<String> {
    let marker = format!("{}='", key);
    let start = raw.find(&marker)? + marker.len();
    let rest = &raw[start..];
    let end = rest.find("';")?;
    Some(rest[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut map = HashMap::new();
        map.insert("ICY-MetaInt".to_string(), "16000".to_string());
        map.insert("icy-name".to_string(), " Jazz FM ".to_string());
        map.insert("icy-br".to_string(), "128,128".to_string());
        map.insert("Content-Type".to_string(), "audio/mpeg".to_string());

        let headers = IcyHeaders::from_map(&map);
        assert_eq!(headers.metaint, 16000);
        assert_eq!(headers.name.as_deref(), Some("Jazz FM"));
        assert_eq!(headers.bitrate, Some(128));
        assert_eq!(headers.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(headers.genre, None);
    }

    #[test]
    fn test_missing_or_bad_metaint_is_zero() {
        let mut map = HashMap::new();
        assert_eq!(IcyHeaders::from_map(&map).metaint, 0);
        map.insert("icy-metaint".to_string(), "lots".to_string());
        assert_eq!(IcyHeaders::from_map(&map).metaint, 0);
    }

    #[test]
    fn test_parse_block_with_padding() {
        let mut block = b"StreamTitle='Artist - Song';StreamUrl='http://x.example';".to_vec();
        block.resize(64, 0);
        let meta = parse_metadata_block(&block);
        assert_eq!(meta.title, "Artist - Song");
        assert_eq!(meta.url.as_deref(), Some("http://x.example"));
        assert!(!meta.raw.contains('\0'));
    }

    #[test]
    fn test_apostrophe_in_title() {
        let meta = parse_metadata_block(b"StreamTitle='Don't Stop';");
        assert_eq!(meta.title, "Don't Stop");
    }

    #[test]
    fn test_unmatched_block_keeps_raw() {
        let meta = parse_metadata_block(b"  some station text\0\0");
        assert_eq!(meta.title, "");
        assert_eq!(meta.raw, "some station text");
        assert_eq!(meta.url, None);
    }
}
