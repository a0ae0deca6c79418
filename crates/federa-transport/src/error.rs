use federa_codec::CodecError;

/// Errors that can occur while moving packets over a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The packet bytes could not be compressed or decompressed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The decompressed value does not have the shape of a packet.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4644 \"FD\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has not been opened.
    #[error("connection not open")]
    NotOpen,

    /// The connection or its peer has gone away.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Returns true if the stream can no longer be trusted and must be reset.
    ///
    /// A malformed packet shape leaves the dictionaries in step, so only
    /// desynchronising codec errors and framing errors are fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Codec(err) => err.is_desync(),
            TransportError::InvalidPacket(_) => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
