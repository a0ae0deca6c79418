//! Tokio codec for framed, compressed packets.

use bytes::BytesMut;
use federa_codec::CodecConfig;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Result, TransportError};
use crate::frame::{decode_frame, encode_frame, FrameConfig};
use crate::message::Payload;
use crate::packet::PacketCoder;

/// Frames and compresses packets for use with `tokio_util::codec::Framed`.
///
/// One codec instance carries one connection's dictionaries in both
/// directions; create a new codec for every new stream.
#[derive(Debug, Default)]
pub struct PacketCodec {
    coder: PacketCoder,
    frame: FrameConfig,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(codec: CodecConfig, frame: FrameConfig) -> Self {
        Self {
            coder: PacketCoder::new(codec),
            frame,
        }
    }
}

impl Decoder for PacketCodec {
    type Item = Payload;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match decode_frame(src, self.frame.max_payload_size)? {
            Some(bytes) => self.coder.decode(bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Payload> for PacketCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Payload, dst: &mut BytesMut) -> Result<()> {
        self.encoder_write(&item, dst)
    }
}

impl Encoder<&Payload> for PacketCodec {
    type Error = TransportError;

    fn encode(&mut self, item: &Payload, dst: &mut BytesMut) -> Result<()> {
        self.encoder_write(item, dst)
    }
}

impl PacketCodec {
    fn encoder_write(&mut self, item: &Payload, dst: &mut BytesMut) -> Result<()> {
        let bytes = self.coder.encode(item)?;
        encode_frame(&bytes, self.frame.max_payload_size, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    use super::*;
    use crate::message::{Message, ObjectChange, ObjectChanges};
    use federa_codec::ObjectId;

    fn changes(hp: i64) -> Payload {
        Payload::Messages(vec![Message::ObjectChanges(
            ObjectChanges::new("fed", ObjectId::from_bytes([3; 12]), "Unit", ObjectChange::Update)
                .with_property("hp", hp),
        )])
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = Framed::new(client, PacketCodec::new());
        let mut server = Framed::new(server, PacketCodec::new());

        client.send(Payload::Heartbeat).await.unwrap();
        for hp in 0..3 {
            client.send(changes(hp)).await.unwrap();
        }

        assert_eq!(server.next().await.unwrap().unwrap(), Payload::Heartbeat);
        for hp in 0..3 {
            assert_eq!(server.next().await.unwrap().unwrap(), changes(hp));
        }

        server.send(&Payload::Heartbeat).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), Payload::Heartbeat);
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let (client, server) = tokio::io::duplex(1024);
        let small = FrameConfig::default().with_max_payload_size(4);
        let mut client = Framed::new(client, PacketCodec::new());
        let mut server = Framed::new(server, PacketCodec::with_config(CodecConfig::default(), small));

        client.send(changes(1)).await.unwrap();
        let err = server.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
    }
}
