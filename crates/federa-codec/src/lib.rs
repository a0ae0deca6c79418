//! Dictionary-compressed binary encoding for replicated values.
//!
//! A stream is a sequence of buffers, each holding one top-level map. Every
//! element is written as:
//! - A 1-byte header: value kind, plus inline small values or lengths
//! - A property slot (omitted inside arrays): a dictionary index, with the
//!   name inline the first time it is seen
//! - The payload, if the kind has one
//!
//! Property names and object ids are cached per stream direction, so a
//! [`Compressor`] and its peer [`Decompressor`] must process the same
//! buffers in the same order.

pub mod compressor;
pub mod config;
pub mod decompressor;
pub mod dictionary;
pub mod error;
pub mod object_id;
pub mod primitives;
pub mod value;

pub use compressor::Compressor;
pub use config::{CodecConfig, FloatWidth, DEFAULT_MAX_DEPTH};
pub use decompressor::Decompressor;
pub use dictionary::{OBJECT_SENTINEL, PROPERTY_SENTINEL};
pub use error::{CodecError, Result};
pub use object_id::{ObjectId, ObjectIdGenerator, OBJECT_ID_LEN};
pub use value::{Value, ValueMap};
