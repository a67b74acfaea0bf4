pub const MAX_FUZZ_INTENSITY: u8 = 10;
pub const MAX_CONSTRUCT_INTENSITY: u8 = 3;

pub mod corpus;
pub mod decoder;
pub mod encoder;
pub mod fuzzer;
pub mod mutator;
pub mod params;
pub mod plan;
pub mod session;
pub mod types;

#[cfg(feature = "codec")]
pub mod codec {
    use crate::{
        decoder,
        types::{DecodeError, EncodeError},
    };
    use bytes::{Bytes, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    /// Upper bound on what one partial packet may reserve ahead of its bytes
    /// arriving. The declared remaining length comes from the peer.
    pub const MAX_READ_RESERVE: usize = 64 * 1024;

    /// Splits a byte stream into whole MQTT packets without decoding their
    /// fields, and writes session streams through untouched.
    #[derive(Debug, Default)]
    pub struct RawPacketCodec;

    impl RawPacketCodec {
        pub fn new() -> Self {
            RawPacketCodec
        }
    }

    impl Decoder for RawPacketCodec {
        type Error = DecodeError;
        type Item = Bytes;

        fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            match decoder::peek_packet_len(buf)? {
                Some(packet_len) if buf.len() >= packet_len => {
                    Ok(Some(buf.split_to(packet_len).freeze()))
                },
                Some(packet_len) => {
                    buf.reserve((packet_len - buf.len()).min(MAX_READ_RESERVE));
                    Ok(None)
                },
                None => Ok(None),
            }
        }

        fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            match self.decode(buf)? {
                Some(packet) => Ok(Some(packet)),
                None if buf.is_empty() => Ok(None),
                None => Err(DecodeError::TruncatedStream(buf.split().freeze())),
            }
        }
    }

    impl Encoder<Bytes> for RawPacketCodec {
        type Error = EncodeError;

        fn encode(&mut self, stream: Bytes, bytes: &mut BytesMut) -> Result<(), Self::Error> {
            bytes.extend_from_slice(&stream);
            Ok(())
        }
    }

}
