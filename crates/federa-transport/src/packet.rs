use bytes::Bytes;
use federa_codec::{CodecConfig, Compressor, Decompressor, Value, ValueMap};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::message::Payload;

/// Envelope key wrapping the payload of every packet.
pub const PAYLOAD_KEY: &str = "p";

/// Compression state for one connection: an outbound and an inbound stream.
///
/// Both halves are recreated together whenever the connection reopens, so
/// the peer must reset its own coder at the same point.
#[derive(Debug)]
pub struct PacketCoder {
    config: CodecConfig,
    compressor: Compressor,
    decompressor: Decompressor,
}

impl PacketCoder {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            compressor: Compressor::with_config(config.clone()),
            decompressor: Decompressor::with_config(config.clone()),
            config,
        }
    }

    /// Forget both dictionaries.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Compress a payload inside its `{p: payload}` envelope.
    pub fn encode(&mut self, payload: &Payload) -> Result<Bytes> {
        let mut envelope = ValueMap::new();
        envelope.insert(PAYLOAD_KEY.into(), Value::Map(payload.to_value()));
        let bytes = self.compressor.encode(&envelope)?;
        trace!(packet = ?payload.packet_type(), len = bytes.len(), "encoded packet");
        Ok(bytes)
    }

    /// Decompress a packet and unwrap its payload.
    pub fn decode(&mut self, bytes: Bytes) -> Result<Payload> {
        let envelope = self.decompressor.decode(bytes)?;
        let payload = envelope
            .get(PAYLOAD_KEY)
            .and_then(Value::as_map)
            .ok_or_else(|| TransportError::InvalidPacket("missing payload map 'p'".into()))?;
        Payload::from_value(payload)
    }
}

impl Default for PacketCoder {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}
