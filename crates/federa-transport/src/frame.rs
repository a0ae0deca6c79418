//! Length-prefixed framing for byte streams.
//!
//! Each compressed packet is preceded by a 6-byte header so that packets can
//! be recovered from a stream with arbitrary read boundaries.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "FD" (0x46 0x44).
pub const MAGIC: [u8; 2] = [0x46, 0x44];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for stream framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl FrameConfig {
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Encode one frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬────────────┬─────────────────┐
/// │ Magic (2B)   │ Length     │ Payload         │
/// │ 0x46 0x44    │ (4B LE)    │ (Length bytes)  │
/// │ "FD"         │            │                 │
/// └──────────────┴────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], max_payload: usize, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > max_payload || payload.len() > u32::MAX as usize {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload.min(u32::MAX as usize),
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` until the buffer holds a complete frame, then consumes
/// it and returns the payload.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(TransportError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(TransportError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Reads complete frames from any `Read` stream.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame payload (blocking).
    ///
    /// Returns `Err(TransportError::Closed)` at end of stream.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(payload) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(payload);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            };
            if read == 0 {
                return Err(TransportError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame and write a payload, then flush (blocking).
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(payload, self.config.max_payload_size, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(b"packet", DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        assert_eq!(&buf[..HEADER_SIZE], &[0x46, 0x44, 6, 0, 0, 0]);

        let payload = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"packet");
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_frames_wait_for_more() {
        let mut buf = BytesMut::from(&[0x46, 0x44, 0x05][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());

        let mut buf = BytesMut::new();
        encode_frame(b"hello", DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn invalid_magic() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(TransportError::InvalidMagic)
        ));
    }

    #[test]
    fn payload_limits_both_directions() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(1024);
        assert!(matches!(
            decode_frame(&mut buf, 512),
            Err(TransportError::PayloadTooLarge { size: 1024, max: 512 })
        ));

        let mut out = BytesMut::new();
        assert!(matches!(
            encode_frame(&[0u8; 16], 8, &mut out),
            Err(TransportError::PayloadTooLarge { size: 16, max: 8 })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn reader_handles_partial_reads() {
        let mut wire = BytesMut::new();
        encode_frame(b"one", DEFAULT_MAX_PAYLOAD, &mut wire).unwrap();
        encode_frame(b"", DEFAULT_MAX_PAYLOAD, &mut wire).unwrap();
        encode_frame(b"three", DEFAULT_MAX_PAYLOAD, &mut wire).unwrap();

        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        });
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"one");
        assert!(reader.read_frame().unwrap().is_empty());
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"three");
        assert!(matches!(reader.read_frame(), Err(TransportError::Closed)));
    }

    #[test]
    fn writer_output_is_readable() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(b"abc").unwrap();
        writer.write_frame(&[7u8; 20_000]).unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.get_ref().clone()));
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"abc");
        assert_eq!(reader.read_frame().unwrap().len(), 20_000);
    }

    #[test]
    fn eof_mid_frame_is_closed() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_slice(b"part");
        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(reader.read_frame(), Err(TransportError::Closed)));
    }
}
