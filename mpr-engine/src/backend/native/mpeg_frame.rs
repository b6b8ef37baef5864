//! MPEG audio Layer III frame header parsing
//!
//! Used by the feed decoder to split a raw radio byte stream into whole
//! frames before handing them to the codec.

/// Bytes in a frame header
pub const HEADER_LEN: usize = 4;

const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const RATES_V1: [u32; 3] = [44100, 48000, 32000];
const RATES_V2: [u32; 3] = [22050, 24000, 16000];
const RATES_V25: [u32; 3] = [11025, 12000, 8000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Decoded fields of one Layer III frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channels: u8,
}

impl FrameHeader {
    /// Parse a Layer III header. Returns `None` for anything else,
    /// including free-format and reserved field values.
    pub fn parse(bytes: &[u8]) -> Option<FrameHeader> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        if word & 0xFFE0_0000 != 0xFFE0_0000 {
            return None;
        }

        let version = match (word >> 19) & 0x3 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };

        // Layer bits 01 = Layer III
        if (word >> 17) & 0x3 != 0b01 {
            return None;
        }

        let bitrate_index = ((word >> 12) & 0xF) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => BITRATES_V1_L3[bitrate_index],
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => BITRATES_V2_L3[bitrate_index],
        };

        let rate_index = ((word >> 10) & 0x3) as usize;
        if rate_index == 3 {
            return None;
        }
        let sample_rate = match version {
            MpegVersion::Mpeg1 => RATES_V1[rate_index],
            MpegVersion::Mpeg2 => RATES_V2[rate_index],
            MpegVersion::Mpeg25 => RATES_V25[rate_index],
        };

        let padding = (word >> 9) & 0x1 == 1;
        let channels = if (word >> 6) & 0x3 == 0b11 { 1 } else { 2 };

        Some(FrameHeader {
            version,
            bitrate_kbps,
            sample_rate,
            padding,
            channels,
        })
    }

    /// Samples per channel decoded from one frame
    pub fn samples_per_frame(&self) -> u32 {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 576,
        }
    }

    /// Total frame length in bytes, header included
    pub fn frame_len(&self) -> usize {
        let coefficient = self.samples_per_frame() / 8;
        let len = coefficient * self.bitrate_kbps * 1000 / self.sample_rate;
        len as usize + usize::from(self.padding)
    }
}

/// Offset of the first plausible frame header in `data`
pub fn find_sync(data: &[u8]) -> Option<usize> {
    data.windows(HEADER_LEN)
        .position(|window| FrameHeader::parse(window).is_some())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo, no CRC
    pub(crate) const HEADER_128K_44K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

    #[test]
    fn test_parse_common_header() {
        let header = FrameHeader::parse(&HEADER_128K_44K).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.bitrate_kbps, 128);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channels, 2);
        assert!(!header.padding);
        assert_eq!(header.frame_len(), 417);
        assert_eq!(header.samples_per_frame(), 1152);
    }

    #[test]
    fn test_padding_and_mono() {
        // padding bit set, channel mode 11 (mono)
        let header = FrameHeader::parse(&[0xFF, 0xFB, 0x92, 0xC0]).unwrap();
        assert!(header.padding);
        assert_eq!(header.channels, 1);
        assert_eq!(header.frame_len(), 418);
    }

    #[test]
    fn test_mpeg2_half_rate() {
        // MPEG-2 Layer III, 64 kbps, 22.05 kHz
        let header = FrameHeader::parse(&[0xFF, 0xF3, 0x80, 0x00]).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg2);
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(header.bitrate_kbps, 64);
        assert_eq!(header.samples_per_frame(), 576);
        assert_eq!(header.frame_len(), 208);
    }

    #[test]
    fn test_rejects_other_layers_and_reserved_values() {
        // Layer II
        assert!(FrameHeader::parse(&[0xFF, 0xFD, 0x90, 0x00]).is_none());
        // free format bitrate
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0x00, 0x00]).is_none());
        // reserved sample rate
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0x9C, 0x00]).is_none());
        // no sync
        assert!(FrameHeader::parse(&[0x00, 0xFB, 0x90, 0x00]).is_none());
        assert!(FrameHeader::parse(&[0xFF]).is_none());
    }

    #[test]
    fn test_find_sync_skips_garbage() {
        let mut data = vec![0x12, 0x34, 0xFF, 0x00];
        data.extend_from_slice(&HEADER_128K_44K);
        assert_eq!(find_sync(&data), Some(4));
        assert_eq!(find_sync(&[0u8; 16]), None);
    }
}
