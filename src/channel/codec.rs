//! Line framing for the serial link to vehicle controllers.
//!
//! Payloads are escaped so they never contain line terminators, then written
//! as one line each. Lines coming back from a controller carry the
//! [`FRAME_PREFIX`]; anything else on the line is controller debug output.

use std::collections::VecDeque;

pub const FRAME_PREFIX: &[u8] = b"#VANET ";

const ESCAPE: u8 = 0x11;

/// Escapes `0x11`, `\n`, `\r` and `\0`.
pub fn encode(source: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len() + 4);
    for &c in source {
        match c {
            ESCAPE => out.extend_from_slice(&[ESCAPE, 0x11]),
            0x0A => out.extend_from_slice(&[ESCAPE, 0x12]),
            0x0D => out.extend_from_slice(&[ESCAPE, 0x13]),
            0x00 => out.extend_from_slice(&[ESCAPE, 0x14]),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses [`encode`]. A trailing lone escape byte is dropped and unknown
/// escape codes pass through unchanged.
pub fn decode(source: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len());
    let mut iter = source.iter().copied();
    while let Some(c) = iter.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match iter.next() {
            Some(0x12) => out.push(0x0A),
            Some(0x13) => out.push(0x0D),
            Some(0x14) => out.push(0x00),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// One complete line: escaped payload plus newline, optionally prefixed.
pub fn encode_frame(payload: &[u8], prefixed: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + FRAME_PREFIX.len() + 2);
    if prefixed {
        out.extend_from_slice(FRAME_PREFIX);
    }
    out.extend(encode(payload));
    out.push(b'\n');
    out
}

/// Splits a byte stream into decoded frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    prefix: &'static [u8],
    line: Vec<u8>,
    frames: VecDeque<Vec<u8>>,
}

impl FrameReader {
    /// Reader for controller output: only prefixed lines are frames.
    pub fn prefixed() -> Self {
        Self {
            prefix: FRAME_PREFIX,
            ..Default::default()
        }
    }

    /// Reader that treats every line as a frame.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                let line = std::mem::take(&mut self.line);
                if let Some(payload) = line.strip_prefix(self.prefix) {
                    self.frames.push_back(decode(payload));
                }
            } else {
                self.line.push(b);
            }
        }
    }

    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_reserved_bytes() {
        assert_eq!(encode(&[0x11, 0x0A, 0x0D, 0x00, b'R']), vec![0x11, 0x11, 0x11, 0x12, 0x11, 0x13, 0x11, 0x14, b'R']);
    }

    #[test]
    fn test_decode_reverses_encode_for_tile_payloads() {
        let payload: Vec<u8> = (0u8..36).collect();
        let encoded = encode(&payload);
        assert!(!encoded.contains(&b'\n'));
        assert!(!encoded.contains(&0));
        assert_eq!(decode(&encoded), payload);
    }

    #[test]
    fn test_trailing_escape_is_dropped() {
        assert_eq!(decode(&[b'a', 0x11]), b"a".to_vec());
        assert_eq!(decode(&[0x11, b'x']), b"x".to_vec());
    }

    #[test]
    fn test_reader_skips_debug_lines() {
        let mut reader = FrameReader::prefixed();
        reader.push(b"booting mote\n");
        reader.push(&encode_frame(b"init", true));
        reader.push(b"#VAN");
        assert_eq!(reader.next_frame(), Some(b"init".to_vec()));
        assert_eq!(reader.next_frame(), None);

        reader.push(b"ET joined\x11\x14\n");
        assert_eq!(reader.next_frame(), Some(b"joined\x00".to_vec()));
    }

    #[test]
    fn test_plain_reader_takes_every_line() {
        let mut reader = FrameReader::plain();
        reader.push(&encode_frame(b"J", false));
        reader.push(&encode_frame(&[b'R', 0, 10, 13], false));
        assert_eq!(reader.pending(), 2);
        assert_eq!(reader.next_frame(), Some(b"J".to_vec()));
        assert_eq!(reader.next_frame(), Some(vec![b'R', 0, 10, 13]));
    }
}
