//! Domain-specific error types for the frame bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`.
//! No panics on invalid input: every error is typed and recoverable,
//! except [`BridgeError::ListenerFailed`], which the service treats as
//! fatal.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the frame bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Encoding Errors ──────────────────────────────────────────
    /// The scratch buffer cannot hold the requested frame message.
    #[error("buffer too small: need {required} bytes (capacity {capacity})")]
    BufferTooSmall { required: usize, capacity: usize },

    /// The dirty rectangle is inverted or lies outside the canvas.
    #[error("invalid region: {0}")]
    InvalidRegion(&'static str),

    /// The pixel source does not match the encoder's pixel depth.
    #[error("pixel depth mismatch: encoder uses {expected} bpp, pixels are {actual} bpp")]
    DepthMismatch { expected: u8, actual: u8 },

    /// The pixel source holds a different number of pixels than the region.
    #[error("pixel count mismatch: region has {expected} pixels, buffer has {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },

    /// A byte did not map to any known pixel depth.
    #[error("unknown pixel depth tag: {0}")]
    UnknownDepth(u8),

    /// A frame message was shorter than its header claims.
    #[error("truncated frame message: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    // ── Session Errors ───────────────────────────────────────────
    /// Every slot in the session table is occupied.
    #[error("session table full ({capacity} slots)")]
    SessionTableFull { capacity: usize },

    /// The upgrade handshake could not be completed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    /// The first request on a connection could not be understood.
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    /// An inbound transport frame violated the framing rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// An inbound transport frame exceeded the configured limit.
    #[error("inbound frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The accept loop lost its listener. The process must restart.
    #[error("listener failed: {0}")]
    ListenerFailed(std::io::Error),

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Whether the error means the process can no longer serve viewers.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::ListenerFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = BridgeError::BufferTooSmall {
            required: 1000,
            capacity: 500,
        };
        assert!(e.to_string().contains("buffer too small"));
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = BridgeError::SessionTableFull { capacity: 4 };
        assert!(e.to_string().contains("4 slots"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: BridgeError = io_err.into();
        assert!(matches!(e, BridgeError::Connection(_)));
        assert!(!e.is_fatal());
    }

    #[test]
    fn listener_failure_is_fatal() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "listener gone");
        assert!(BridgeError::ListenerFailed(io_err).is_fatal());
    }
}
