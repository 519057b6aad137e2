//! Deterministic little-endian byte codec used both on the wire and as the
//! exact message fed to the signature primitive.
//!
//! Every multi-byte integer is little-endian. Strings are written one byte
//! per UTF-16 code unit (truncated to the low 8 bits) and terminated with a
//! single `0x00` — mirroring the `charCodeAt`-based encoding of the source
//! this format was distilled from. Any greenfield wire format would use
//! UTF-8; this one deliberately doesn't, because bit-compatibility with
//! existing OWIDs depends on it. See `DESIGN.md`.

use crate::error::{OwidError, Result};

/// Appends values to a growable byte buffer using OWID's canonical encoding.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_byte(&mut self, v: u32) -> Result<&mut Self> {
        if v > u8::MAX as u32 {
            return Err(OwidError::OutOfRange(v));
        }
        self.buf.push(v as u8);
        Ok(self)
    }

    pub fn write_uint16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_uint32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Alias for [`Writer::write_uint32`] — OWID timestamps are minutes
    /// since the epoch base, stored as a plain `u32`.
    pub fn write_date(&mut self, v: u32) -> &mut Self {
        self.write_uint32(v)
    }

    /// Writes `s` one byte per UTF-16 code unit (low 8 bits only),
    /// terminated with `0x00`. Fails [`OwidError::EmptyString`] on an empty
    /// string.
    pub fn write_string(&mut self, s: &str) -> Result<&mut Self> {
        if s.is_empty() {
            return Err(OwidError::EmptyString);
        }
        for unit in s.encode_utf16() {
            self.buf.push((unit & 0x00FF) as u8);
        }
        self.buf.push(0);
        Ok(self)
    }

    /// Writes a `uint16` count followed by each string. An empty list writes
    /// `0x0000`. Fails [`OwidError::TooLong`] if `list.len() > u16::MAX`.
    pub fn write_strings<S: AsRef<str>>(&mut self, list: &[S]) -> Result<&mut Self> {
        if list.len() > u16::MAX as usize {
            return Err(OwidError::TooLong(list.len()));
        }
        self.write_uint16(list.len() as u16);
        for s in list {
            self.write_string(s.as_ref())?;
        }
        Ok(self)
    }

    pub fn write_byte_array(&mut self, a: &[u8]) -> &mut Self {
        self.write_uint32(a.len() as u32);
        self.write_byte_array_no_length(a)
    }

    pub fn write_byte_array_no_length(&mut self, a: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(a);
        self
    }

    /// Writes a raw 64-byte ECDSA `r||s` signature. Fails
    /// [`OwidError::BadSignatureLength`] if `sig.len() != 64`.
    pub fn write_signature(&mut self, sig: &[u8]) -> Result<&mut Self> {
        if sig.len() != 64 {
            return Err(OwidError::BadSignatureLength(sig.len()));
        }
        self.buf.extend_from_slice(sig);
        Ok(self)
    }
}

/// Reads values out of a byte slice, owning a position cursor. Every read
/// that would run past the end of the slice fails [`OwidError::Truncated`].
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(OwidError::Truncated)?;
        if end > self.buf.len() {
            return Err(OwidError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_uint32(&mut self) -> Result<u32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("exactly 4 bytes");
        Ok(u32::from_le_bytes(bytes))
    }

    /// Alias for [`Reader::read_uint32`].
    pub fn read_date(&mut self) -> Result<u32> {
        self.read_uint32()
    }

    /// Reads bytes until (and past) the next `0x00`, decoding each byte as
    /// one UTF-16 code unit — the inverse of [`Writer::write_string`].
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let terminator = self.buf[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(OwidError::Truncated)?;
        let bytes = &self.buf[start..start + terminator];
        self.pos = start + terminator + 1;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let len = self.read_uint32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads exactly 64 raw signature bytes.
    pub fn read_signature(&mut self) -> Result<[u8; 64]> {
        let bytes = self.take(64)?;
        let mut out = [0u8; 64];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Standard RFC 4648 base64 (with padding), used for the JSON form of an
/// OWID's signature.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(s)
    }
}
