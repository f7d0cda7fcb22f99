//! Message framing for the viewer transport (RFC 6455 subset).
//!
//! Outbound frames are never masked and always carry a complete
//! message (`FIN` set). The payload length uses one of three size
//! classes:
//!
//! ```text
//! len ≤ 125      [b0, len]                       2 bytes
//! len < 65536    [b0, 126, len:u16be]            4 bytes
//! otherwise      [b0, 127, len:u64be]           10 bytes
//! ```
//!
//! Inbound frames are decoded by [`WsFrameCodec`].

pub mod codec;

pub use codec::{WsFrame, WsFrameCodec};

use bitflags::bitflags;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

/// Longest outbound frame header.
pub const MAX_HEADER_LEN: usize = 10;

/// Largest payload that fits the inline length form.
const INLINE_MAX: usize = 125;

/// Close status sent when the server ends a session.
pub const CLOSE_NORMAL: u16 = 1000;

bitflags! {
    /// Flag bits of the first frame byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameBits: u8 {
        const FIN = 0x80;
        const RSV1 = 0x40;
        const RSV2 = 0x20;
        const RSV3 = 0x10;
    }
}

bitflags! {
    /// Flag bits of the second frame byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LengthBits: u8 {
        const MASK = 0x80;
    }
}

// ── Opcode ───────────────────────────────────────────────────────

/// Frame opcode (low nibble of the first byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Control frames may not be fragmented and carry at most 125 bytes.
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

// ── Outbound header ──────────────────────────────────────────────

/// Header length needed for a payload of `payload_len` bytes.
pub fn header_len(payload_len: usize) -> usize {
    if payload_len <= INLINE_MAX {
        2
    } else if payload_len <= u16::MAX as usize {
        4
    } else {
        MAX_HEADER_LEN
    }
}

/// Write an unmasked, final frame header into `out`.
///
/// Returns the number of header bytes used; the header occupies
/// `out[..n]`.
pub fn write_header(opcode: Opcode, payload_len: usize, out: &mut [u8; MAX_HEADER_LEN]) -> usize {
    out[0] = FrameBits::FIN.bits() | opcode as u8;
    if payload_len <= INLINE_MAX {
        out[1] = payload_len as u8;
        2
    } else if payload_len <= u16::MAX as usize {
        out[1] = 126;
        out[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        4
    } else {
        out[1] = 127;
        out[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
        MAX_HEADER_LEN
    }
}

/// A complete close frame carrying `code`.
pub fn close_frame(code: u16) -> [u8; 4] {
    let [hi, lo] = code.to_be_bytes();
    [FrameBits::FIN.bits() | Opcode::Close as u8, 2, hi, lo]
}

/// `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    derive_accept_key(client_key.trim().as_bytes())
}

// ── Tests ────────────────────────────────────────────────────────
