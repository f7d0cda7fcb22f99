//! Reusable, bounds-checked output buffer for frame messages.
//!
//! The buffer is allocated once at startup. Every write checks the
//! remaining capacity and fails with [`BridgeError::BufferTooSmall`]
//! instead of growing or overrunning.
//!
//! A fixed headroom in front of the body lets the transport framing
//! header be prepended in place once the body length is known:
//!
//! ```text
//! ┌──────────── headroom ────────────┬────────── body ──────────┐
//! │ (unused) │ transport frame header │ frame header │ pixels    │
//! └──────────┴────────────────────────┴──────────────┴───────────┘
//!            ^ start                  ^ headroom                ^ end
//! ```

use crate::error::BridgeError;

/// Arena-style byte buffer with an explicit write cursor.
pub struct ScratchBuffer {
    buf: Box<[u8]>,
    headroom: usize,
    /// First byte of the prepended header (== `headroom` when none).
    start: usize,
    /// One past the last body byte.
    end: usize,
}

impl ScratchBuffer {
    /// Allocate a buffer with `capacity` body bytes and `headroom`
    /// bytes reserved for a prefix.
    pub fn with_headroom(capacity: usize, headroom: usize) -> Self {
        Self {
            buf: vec![0u8; headroom + capacity].into_boxed_slice(),
            headroom,
            start: headroom,
            end: headroom,
        }
    }

    /// Maximum number of body bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len() - self.headroom
    }

    /// Body bytes written since the last [`clear`](Self::clear).
    pub fn len(&self) -> usize {
        self.end - self.headroom
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.end
    }

    /// Reset the cursor. The allocation is kept.
    pub fn clear(&mut self) {
        self.start = self.headroom;
        self.end = self.headroom;
    }

    fn reserve(&mut self, n: usize) -> Result<&mut [u8], BridgeError> {
        if n > self.remaining() {
            return Err(BridgeError::BufferTooSmall {
                required: self.len() + n,
                capacity: self.capacity(),
            });
        }
        let at = self.end;
        self.end += n;
        Ok(&mut self.buf[at..at + n])
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), BridgeError> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    pub fn put_u16_be(&mut self, value: u16) -> Result<(), BridgeError> {
        self.reserve(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Place `prefix` immediately in front of the body.
    ///
    /// Replaces any earlier prefix. Fails when the prefix is longer
    /// than the headroom.
    pub fn prepend(&mut self, prefix: &[u8]) -> Result<(), BridgeError> {
        if prefix.len() > self.headroom {
            return Err(BridgeError::BufferTooSmall {
                required: prefix.len(),
                capacity: self.headroom,
            });
        }
        self.start = self.headroom - prefix.len();
        self.buf[self.start..self.headroom].copy_from_slice(prefix);
        Ok(())
    }

    /// The body alone.
    pub fn body(&self) -> &[u8] {
        &self.buf[self.headroom..self.end]
    }

    /// Prefix and body, contiguous.
    pub fn framed(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_until_full_then_fails() {
        let mut buf = ScratchBuffer::with_headroom(5, 0);
        buf.put_u8(1).unwrap();
        buf.put_u16_be(0x0203).unwrap();
        buf.put_slice(&[4, 5]).unwrap();
        assert_eq!(buf.body(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.remaining(), 0);

        let err = buf.put_u8(6).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::BufferTooSmall {
                required: 6,
                capacity: 5
            }
        ));
        // The failed write left the body untouched.
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn partial_write_is_rejected_whole() {
        let mut buf = ScratchBuffer::with_headroom(3, 0);
        buf.put_u16_be(0xAAAA).unwrap();
        assert!(buf.put_u16_be(0xBBBB).is_err());
        assert_eq!(buf.body(), &[0xAA, 0xAA]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buf = ScratchBuffer::with_headroom(4, 2);
        buf.put_slice(&[9; 4]).unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
        buf.put_slice(&[1; 4]).unwrap();
    }

    #[test]
    fn prepend_is_contiguous_with_body() {
        let mut buf = ScratchBuffer::with_headroom(4, 10);
        buf.put_slice(&[7, 8]).unwrap();
        buf.prepend(&[0x82, 0x02]).unwrap();
        assert_eq!(buf.framed(), &[0x82, 0x02, 7, 8]);
        assert_eq!(buf.body(), &[7, 8]);

        // A longer prefix replaces the shorter one.
        buf.prepend(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.framed(), &[1, 2, 3, 4, 7, 8]);
    }

    #[test]
    fn prepend_longer_than_headroom_fails() {
        let mut buf = ScratchBuffer::with_headroom(4, 2);
        assert!(buf.prepend(&[0; 3]).is_err());
    }
}
