//! Packet transport for federated object replication.
//!
//! This layer turns protocol [`Payload`]s into compressed bytes and moves
//! them over a [`Connection`]:
//! - [`message`]: the packet and message model and its wire-map shape
//! - [`packet`]: the per-connection compressor/decompressor pair
//! - [`frame`]: length-prefixed framing for byte streams
//! - [`MemoryConnection`] and [`StreamConnection`]: connection implementations
//!
//! With the `async` feature, [`PacketCodec`] adapts the same framing to
//! `tokio_util::codec`.

pub mod error;
pub mod frame;
pub mod memory;
pub mod message;
pub mod packet;
pub mod stream;
pub mod traits;

#[cfg(feature = "async")]
pub mod codec;

pub use error::{Result, TransportError};
pub use frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
pub use memory::MemoryConnection;
pub use message::{
    Credentials, Message, MessageType, ObjectChange, ObjectChanges, PacketType, Payload,
    ProcessType,
};
pub use packet::PacketCoder;
pub use stream::StreamConnection;
pub use traits::{Connection, ConnectionEvent};

#[cfg(feature = "async")]
pub use codec::PacketCodec;
