//! Positioned binary reader over an owned byte buffer.
//!
//! Mirrors the bounds-checked primitive reads the reference engine's own
//! `Parser` performs by hand, but routes multi-byte decodes through
//! `byteorder` so the behavior on a big-endian host is correct rather than
//! accidental.

use byteorder::{ByteOrder, LittleEndian};
use hcb_nls::{Decoder, TextDecoder};

use crate::error::ReaderError;

/// A little-endian cursor anchored at the start of `buffer`. `pos` is always
/// relative to that anchor, so nested reads (e.g. seeking into the metadata
/// block and back) share one addressing scheme.
pub struct Reader {
    buffer: Vec<u8>,
    pos: usize,
    decoder: Decoder,
}

impl Reader {
    pub fn new(buffer: Vec<u8>, decoder: Decoder) -> Self {
        Self {
            buffer,
            pos: 0,
            decoder,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn seek_to(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    fn take(&mut self, n: usize) -> Result<&[u8], ReaderError> {
        let end = self.pos.checked_add(n).ok_or(ReaderError::EndOfStream {
            offset: self.pos,
            needed: n,
        })?;
        let slice = self
            .buffer
            .get(self.pos..end)
            .ok_or(ReaderError::EndOfStream {
                offset: self.pos,
                needed: n,
            })?;
        self.pos = end;
        Ok(slice)
    }

    /// Peek at a single byte without advancing the cursor. Used by the
    /// dispatcher to validate a `Call` target begins with `InitStack`.
    pub fn peek_u8_at(&self, pos: usize) -> Option<u8> {
        self.buffer.get(pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ReaderError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, ReaderError> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ReaderError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ReaderError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Length-prefixed string read. `L == 0` is invalid; `L == 1` is an
    /// empty string that still consumes its trailing byte; `L > 1` reads
    /// `L - 1` payload bytes followed by one terminator byte that is
    /// consumed but not part of the decoded text.
    pub fn read_string(&mut self) -> Result<String, ReaderError> {
        let len = self.read_u8()? as usize;
        if len == 0 {
            return Err(ReaderError::InvalidData("zero-length string prefix"));
        }
        if len == 1 {
            self.take(1)?;
            return Ok(String::new());
        }
        let payload = self.take(len - 1)?.to_vec();
        self.take(1)?;
        let text = self.decoder.decode(&payload).into_owned();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcb_nls::Encoding;
    use pretty_assertions::assert_eq;

    fn reader(bytes: Vec<u8>) -> Reader {
        Reader::new(bytes, Decoder::new(Encoding::Utf8))
    }

    #[test]
    fn reads_i32_round_trip() {
        let values: [i32; 4] = [0, 1, -1, i32::MIN];
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut r = reader(bytes);
        for v in values {
            assert_eq!(r.read_i32().unwrap(), v);
        }
    }

    #[test]
    fn short_read_fails_end_of_stream() {
        let mut r = reader(vec![1, 2, 3]);
        assert!(r.read_u32().is_err());
    }

    #[test]
    fn zero_length_string_is_invalid() {
        let mut r = reader(vec![0]);
        assert!(r.read_string().is_err());
    }

    #[test]
    fn length_one_string_is_empty() {
        let mut r = reader(vec![1, 0xAA]);
        assert_eq!(r.read_string().unwrap(), "");
    }

    #[test]
    fn framed_string_decodes() {
        // "ab" -> 2 payload bytes, L = 3, plus 1 trailing byte.
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(b"ab");
        bytes.push(0);
        let mut r = reader(bytes);
        assert_eq!(r.read_string().unwrap(), "ab");
    }
}
