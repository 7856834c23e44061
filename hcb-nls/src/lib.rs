//! hcb-nls
//!
//! Text decoding for strings embedded in HCB scripts. The bytecode format
//! itself says nothing about the encoding of embedded string bytes, so this
//! lives as a small sibling crate rather than inside the VM core, the same
//! way the engine this VM's bytecode format is modeled on keeps its national
//! language support code out of the interpreter proper.

use anyhow::Result;
use encoding_rs::{Encoding as RsEncoding, GB18030, SHIFT_JIS, UTF_8};
use std::borrow::Cow;

pub trait TextDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;

    /// Stop at the first NUL, matching how embedded C-style titles and
    /// syscall names are stored.
    fn decode_cstr<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    ShiftJis,
    /// Treated as GB18030 (a strict superset), robust for legacy CN assets.
    Gbk,
    Gb18030,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::Utf8 => UTF_8,
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Gbk => GB18030,
            Encoding::Gb18030 => GB18030,
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

/// A decoder bound to a single encoding, cheap to copy and pass around.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    enc: Encoding,
}

impl Decoder {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.enc
    }

    /// Best-effort encode back to bytes; unrepresentable characters are replaced.
    pub fn encode<'a>(&self, s: &'a str) -> Cow<'a, [u8]> {
        let enc = self.enc.as_encoding_rs();
        let (cow, _had_errors, _) = enc.encode(s);
        cow
    }

    pub fn encode_owned(&self, s: &str) -> Vec<u8> {
        self.encode(s).into_owned()
    }
}

impl TextDecoder for Decoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self.enc {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => Cow::Owned(String::from_utf8_lossy(bytes).into_owned()),
            },
            Encoding::ShiftJis | Encoding::Gbk | Encoding::Gb18030 => {
                let enc = self.enc.as_encoding_rs();
                let (cow, _had_errors, _) = enc.decode(bytes);
                cow
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(Encoding::default())
    }
}

/// Decode a NUL-padded, non-length-checked byte slice as a Rust string,
/// falling back to lossy UTF-8 on hard failures so metadata parsing never
/// aborts over a display string.
pub fn decode_lossy(enc: Encoding, bytes: &[u8]) -> Result<String> {
    Ok(Decoder::new(enc).decode(bytes).into_owned())
}
