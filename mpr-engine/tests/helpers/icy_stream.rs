//! Crafted ICY streams

use std::io::{Cursor, Read};

/// Metadata block for `text`: length byte followed by NUL-padded text
pub fn metadata_block(text: &str) -> Vec<u8> {
    let padded_len = text.len().div_ceil(16) * 16;
    let mut block = vec![(padded_len / 16) as u8];
    block.extend_from_slice(text.as_bytes());
    block.resize(1 + padded_len, 0);
    block
}

/// Stream of `cycles` intervals of `metaint` audio bytes, each followed by a
/// metadata block (`None` = zero-length block). Audio byte `i` of cycle `c`
/// is `c as u8`.
pub fn icy_stream(metaint: usize, blocks: &[Option<&str>]) -> Vec<u8> {
    let mut stream = Vec::new();
    for (cycle, block) in blocks.iter().enumerate() {
        stream.extend(std::iter::repeat(cycle as u8).take(metaint));
        match block {
            Some(text) => stream.extend(metadata_block(text)),
            None => stream.push(0),
        }
    }
    stream
}

/// Reader that hands out at most `step` bytes per call
pub struct TrickleReader {
    inner: Cursor<Vec<u8>>,
    step: usize,
}

impl TrickleReader {
    pub fn new(data: Vec<u8>, step: usize) -> Self {
        Self {
            inner: Cursor::new(data),
            step: step.max(1),
        }
    }
}

impl Read for TrickleReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = buf.len().min(self.step);
        self.inner.read(&mut buf[..len])
    }
}
