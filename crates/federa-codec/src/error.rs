/// Errors that can occur while compressing or decompressing values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A property index points past the end of the property dictionary.
    #[error("invalid property index {index} (dictionary holds {len})")]
    InvalidPropertyIndex { index: usize, len: usize },

    /// An object index points past the end of the object dictionary.
    #[error("invalid object index {index} (dictionary holds {len})")]
    InvalidObjectIndex { index: usize, len: usize },

    /// The buffer ended in the middle of an element.
    #[error("unexpected end of input (needed {needed} bytes, {remaining} remaining)")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// The element header does not name a known value kind.
    #[error("invalid element header 0x{0:02x}")]
    InvalidHeader(u8),

    /// A string or property name is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// Nested maps/arrays exceed the configured depth.
    #[error("nesting deeper than {max} levels")]
    NestingTooDeep { max: usize },

    /// The integer cannot be represented in the wire format.
    #[error("integer {0} outside encodable range")]
    IntegerOutOfRange(i64),

    /// The binary value is too large for a 32-bit length prefix.
    #[error("binary value too large ({0} bytes)")]
    BinaryTooLarge(usize),

    /// A zero-terminated string or name contains a NUL byte.
    #[error("zero-terminated string contains an interior NUL byte")]
    InteriorNul,

    /// An object identifier could not be parsed.
    #[error("invalid object id '{0}'")]
    InvalidObjectId(String),
}

impl CodecError {
    /// Returns true if the error means the peer dictionaries are out of step.
    ///
    /// Such errors are fatal to the stream: the connection must be reset.
    pub fn is_desync(&self) -> bool {
        !matches!(
            self,
            CodecError::IntegerOutOfRange(_)
                | CodecError::BinaryTooLarge(_)
                | CodecError::InteriorNul
                | CodecError::InvalidObjectId(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
