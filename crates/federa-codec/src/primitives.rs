//! Fixed-width and string primitives shared by the compressor and decompressor.
//!
//! Integer lengths and payloads are big-endian; floats are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Element header type codes. Bit 7 of a header carries bit 8 of the
/// property index and is masked off before matching.
pub mod tag {
    pub const TERMINATOR: u8 = 0x00;
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const MAP: u8 = 0x04;
    pub const ARRAY: u8 = 0x05;
    pub const FLOAT32: u8 = 0x06;
    pub const FLOAT64: u8 = 0x07;
    /// Low 3 bits carry bits 8..10 of the object index.
    pub const OBJECT: u8 = 0x08;
    /// Low 5 bits carry the value 0..23.
    pub const SMALL_INT: u8 = 0x20;
    /// Bit 2 marks a negative value, bits 0..1 select 1, 2 or 4 bytes.
    pub const INT: u8 = 0x38;
    pub const INT_NEGATIVE: u8 = 0x04;
    /// Low 5 bits carry the length 1..30, or 0 / 0x1F for a 16 / 32-bit length.
    pub const BINARY: u8 = 0x40;
    pub const BINARY_LONG: u8 = 0x5F;
    /// Low 5 bits carry the length 1..31, or 0 for a zero-terminated string.
    pub const STRING: u8 = 0x60;

    pub const PROPERTY_HIGH_BIT: u8 = 0x80;
    pub const TYPE_MASK: u8 = 0x7F;
}

/// Append-only output buffer that grows by half its length when full.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&mut self, additional: usize) {
        let spare = self.buf.capacity() - self.buf.len();
        if additional > spare {
            let grow = (self.buf.len() / 2).max(additional);
            self.buf.reserve(grow);
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.ensure(1);
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.ensure(2);
        self.buf.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.ensure(4);
        self.buf.put_u32(value);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.ensure(4);
        self.buf.put_f32_le(value);
    }

    pub fn put_f64(&mut self, value: f64) {
        self.ensure(8);
        self.buf.put_f64_le(value);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf.put_slice(bytes);
    }

    /// Write a string followed by a zero terminator.
    pub fn put_cstr(&mut self, s: &str) {
        self.put_slice(s.as_bytes());
        self.put_u8(0);
    }

    /// Take the written bytes, leaving the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

/// Bounds-checked reader over a received buffer.
#[derive(Debug)]
pub struct WireReader {
    buf: Bytes,
}

impl WireReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn f32(&mut self) -> Result<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Split off the next `len` bytes without copying.
    pub fn bytes(&mut self, len: usize) -> Result<Bytes> {
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Read a UTF-8 string of known length.
    pub fn str(&mut self, len: usize) -> Result<String> {
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a zero-terminated UTF-8 string, consuming the terminator.
    pub fn cstr(&mut self) -> Result<String> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::UnexpectedEof {
                needed: self.buf.remaining() + 1,
                remaining: self.buf.remaining(),
            })?;
        let s = self.str(end)?;
        self.buf.advance(1);
        Ok(s)
    }
}
