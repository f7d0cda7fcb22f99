//! Inbound frame decoder for viewer → server traffic.
//!
//! Viewers must mask every frame. Payloads above the configured
//! limit are rejected before any of them is buffered, so a single
//! viewer cannot make the server allocate without bound.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::{FrameBits, LengthBits, Opcode};
use crate::error::BridgeError;

/// One decoded, unmasked inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsFrame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Bytes,
}

/// `tokio_util` decoder for masked client frames.
#[derive(Debug, Clone)]
pub struct WsFrameCodec {
    max_payload: usize,
}

impl WsFrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Decoder for WsFrameCodec {
    type Item = WsFrame;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        let first = src[0];
        let second = src[1];
        let bits = FrameBits::from_bits_truncate(first);
        if bits.intersects(FrameBits::RSV1 | FrameBits::RSV2 | FrameBits::RSV3) {
            return Err(BridgeError::ProtocolViolation("reserved bits set"));
        }
        let opcode =
            Opcode::from_u8(first & 0x0F).ok_or(BridgeError::ProtocolViolation("unknown opcode"))?;
        if !LengthBits::from_bits_truncate(second).contains(LengthBits::MASK) {
            return Err(BridgeError::ProtocolViolation("unmasked client frame"));
        }
        let fin = bits.contains(FrameBits::FIN);

        let (payload_len, len_bytes) = match second & 0x7F {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([src[2], src[3]]) as u64, 2)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&src[2..10]);
                (u64::from_be_bytes(raw), 8)
            }
            n => (n as u64, 0),
        };

        if opcode.is_control() && (!fin || payload_len > 125) {
            return Err(BridgeError::ProtocolViolation("oversized or fragmented control frame"));
        }
        if payload_len > self.max_payload as u64 {
            return Err(BridgeError::FrameTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        let payload_len = payload_len as usize;
        let header_len = 2 + len_bytes + 4;
        if src.len() < header_len + payload_len {
            src.reserve(header_len + payload_len - src.len());
            return Ok(None);
        }

        let mut mask = [0u8; 4];
        mask.copy_from_slice(&src[2 + len_bytes..header_len]);
        src.advance(header_len);
        let mut payload = src.split_to(payload_len);
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }

        Ok(Some(WsFrame {
            fin,
            opcode,
            payload: payload.freeze(),
        }))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

    /// Build a masked client frame the way a browser would.
    fn client_frame(first: u8, payload: &[u8]) -> BytesMut {
        let mut out = BytesMut::new();
        out.extend_from_slice(&[first]);
        if payload.len() <= 125 {
            out.extend_from_slice(&[0x80 | payload.len() as u8]);
        } else {
            out.extend_from_slice(&[0x80 | 126]);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(&MASK);
        for (i, b) in payload.iter().enumerate() {
            out.extend_from_slice(&[b ^ MASK[i % 4]]);
        }
        out
    }

    #[test]
    fn decodes_masked_binary_frame() {
        let mut codec = WsFrameCodec::new(1024);
        let mut src = client_frame(0x82, &[1, 0x01, 0x2C, 0x00, 0x96]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(&frame.payload[..], &[1, 0x01, 0x2C, 0x00, 0x96]);
        assert!(src.is_empty());
    }

    #[test]
    fn waits_for_complete_frame() {
        let mut codec = WsFrameCodec::new(1024);
        let full = client_frame(0x82, &[9; 40]);
        let mut src = BytesMut::from(&full[..20]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&full[20..]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 40);
    }

    #[test]
    fn decodes_extended_length() {
        let mut codec = WsFrameCodec::new(1024);
        let mut src = client_frame(0x82, &[0x55; 300]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 300);
        assert!(frame.payload.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = WsFrameCodec::new(1024);
        let mut src = client_frame(0x89, b"hi");
        src.extend_from_slice(&client_frame(0x88, &[0x03, 0xE8]));
        assert_eq!(codec.decode(&mut src).unwrap().unwrap().opcode, Opcode::Ping);
        assert_eq!(codec.decode(&mut src).unwrap().unwrap().opcode, Opcode::Close);
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn rejects_unmasked_frame() {
        let mut codec = WsFrameCodec::new(1024);
        let mut src = BytesMut::from(&[0x82u8, 0x01, 0xAA][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(BridgeError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut codec = WsFrameCodec::new(16);
        let mut src = client_frame(0x82, &[0; 200]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(BridgeError::FrameTooLarge { size: 200, max: 16 })
        ));
    }

    #[test]
    fn rejects_fragmented_control_frame() {
        let mut codec = WsFrameCodec::new(1024);
        let mut src = client_frame(0x09, b"x");
        assert!(codec.decode(&mut src).is_err());
    }

    #[test]
    fn rejects_reserved_bits() {
        let mut codec = WsFrameCodec::new(1024);
        let mut src = client_frame(0xC2, b"x");
        assert!(codec.decode(&mut src).is_err());
    }
}
