//! # Frame Codec
//!
//! Tokio codec implementing the length-prefixed wire format.
//!
//! Each frame is a 4-byte big-endian payload length followed by the payload
//! itself. Zero-length payloads are legal. The decoder validates the declared
//! length against the configured maximum *before* buffering any payload
//! bytes, so a hostile peer cannot force a large allocation by lying about
//! frame size.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_LEN};
use crate::error::Error;

/// Encoder/decoder for length-prefixed frames with a configurable payload
/// size limit.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_message_size: usize,
}

impl FrameCodec {
    /// Create a codec enforcing the given maximum payload size.
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// The largest payload this codec will encode or decode.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Error> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let declared = u32::from_be_bytes(prefix) as usize;

        if declared > self.max_message_size {
            return Err(Error::OversizedFrame {
                declared,
                max: self.max_message_size,
            });
        }

        if src.len() < LENGTH_PREFIX_LEN + declared {
            // Not enough payload yet; reserve what the frame still needs.
            src.reserve(LENGTH_PREFIX_LEN + declared - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        Ok(Some(src.split_to(declared).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Error> {
        // Connection::send validates first; this guards direct codec users.
        if item.len() > self.max_message_size {
            return Err(Error::OversizedMessage {
                size: item.len(),
                max: self.max_message_size,
            });
        }

        dst.reserve(LENGTH_PREFIX_LEN + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(codec: &mut FrameCodec, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::copy_from_slice(payload), &mut buf)
            .expect("encode should succeed");
        buf
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = encode_one(&mut codec, b"hello");
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_length_payload_is_a_frame() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = encode_one(&mut codec, b"");
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn partial_prefix_yields_nothing() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&[0u8, 0u8][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn partial_payload_yields_nothing() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = encode_one(&mut codec, b"abcdef");
        let mut truncated = buf.split_to(buf.len() - 2);
        assert!(codec.decode(&mut truncated).unwrap().is_none());
    }

    #[test]
    fn payload_at_limit_accepted() {
        let mut codec = FrameCodec::new(64);
        let payload = vec![0xA5u8; 64];
        let mut buf = encode_one(&mut codec, &payload);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.len(), 64);
    }

    #[test]
    fn encode_rejects_payload_over_limit() {
        let mut codec = FrameCodec::new(64);
        let payload = Bytes::from(vec![0u8; 65]);
        let mut buf = BytesMut::new();
        let err = codec.encode(payload, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::OversizedMessage { size: 65, max: 64 }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_declared_length_rejected_before_payload_arrives() {
        let mut codec = FrameCodec::new(64);
        // Prefix claims 65 bytes; no payload supplied at all.
        let mut buf = BytesMut::from(&65u32.to_be_bytes()[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::OversizedFrame { declared: 65, max: 64 }
        ));
    }

    #[test]
    fn frames_decode_in_order() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        for payload in [&b"first"[..], &b""[..], &b"third"[..]] {
            codec
                .encode(Bytes::copy_from_slice(payload), &mut buf)
                .unwrap();
        }
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"first");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"third");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
