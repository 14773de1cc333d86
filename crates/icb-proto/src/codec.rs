//! Packet codec for tokio.
//!
//! Streaming decoder for the length-prefixed framing: bytes accumulate in the
//! read buffer and complete packets are yielded one at a time, so a single
//! read may surface several packets and a packet may arrive one byte at a
//! time across many reads.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::packet::{Frame, Packet};

/// Tokio codec for packet framing.
#[derive(Debug, Default)]
pub struct IcbCodec;

impl IcbCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for IcbCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let Some(&len) = src.first() else {
            return Ok(None);
        };
        let len = len as usize;
        if len == 0 {
            // Consume the bad byte so the stream does not wedge on it.
            src.advance(1);
            return Err(ProtocolError::EmptyPacket);
        }
        if src.len() < 1 + len {
            src.reserve(1 + len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(1 + len);
        Ok(Some(Frame {
            tag: frame[1],
            payload: frame[2..].to_vec(),
        }))
    }
}

impl Encoder<Packet> for IcbCodec {
    type Error = ProtocolError;

    fn encode(&mut self, pkt: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let bytes = pkt.encode()?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tag;

    #[test]
    fn decode_single_packet() {
        let mut codec = IcbCodec::new();
        let mut buf = BytesMut::from(&Packet::open("a", "hi").encode().unwrap()[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.tag, tag::OPEN);
        assert_eq!(frame.text_fields(), vec!["a", "hi"]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_multiple_packets_in_one_buffer() {
        let mut codec = IcbCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Packet::ping().encode().unwrap());
        buf.extend_from_slice(&Packet::error("bad").encode().unwrap());

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().tag, tag::PING);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.tag, tag::ERROR);
        assert_eq!(second.text_fields(), vec!["bad"]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_partial_packet_waits_for_more() {
        let mut codec = IcbCodec::new();
        let bytes = Packet::open("alice", "split me").encode().unwrap();
        let mut buf = BytesMut::new();

        for &b in &bytes[..bytes.len() - 1] {
            buf.put_u8(b);
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
        buf.put_u8(bytes[bytes.len() - 1]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.text_fields(), vec!["alice", "split me"]);
    }

    #[test]
    fn decode_rejects_zero_length() {
        let mut codec = IcbCodec::new();
        let mut buf = BytesMut::from(&[0u8, b'x'][..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap_err(),
            ProtocolError::EmptyPacket
        ));
        // The zero byte was consumed; the stream can continue.
        assert_eq!(buf.len(), 1);
    }
}
