/// Default maximum nesting of maps and arrays.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Width used when writing non-integer numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatWidth {
    /// 4-byte little-endian (tag 0x06). Interoperable with every peer.
    #[default]
    Single,
    /// 8-byte little-endian (tag 0x07). Only for peers that decode it.
    Double,
}

/// Configuration for the compressor and decompressor.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Float encoding used by the compressor. Default: single precision.
    pub float_width: FloatWidth,
    /// Maximum nesting depth accepted in either direction. Default: 64.
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            float_width: FloatWidth::Single,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
