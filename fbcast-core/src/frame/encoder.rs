//! Frame encoder writing into a single pre-sized scratch buffer.
//!
//! Each call to [`FrameEncoder::encode`] overwrites the previous
//! message, packs the region's pixels for the configured depth, and
//! prepends the transport frame header in place. Nothing is allocated
//! after construction.

use crate::error::BridgeError;
use crate::frame::scratch::ScratchBuffer;
use crate::frame::{Area, FrameHeader, PixelBuffer, PixelDepth};
use crate::ws::{self, Opcode};

// ── EncodedFrame ─────────────────────────────────────────────────

/// Borrowed view of the message just encoded.
///
/// Valid until the next call to [`FrameEncoder::encode`].
#[derive(Debug, Clone, Copy)]
pub struct EncodedFrame<'a> {
    /// Transport header followed by the frame message; ready to write.
    pub wire: &'a [u8],
    /// The frame message alone.
    pub payload: &'a [u8],
}

// ── FrameEncoder ─────────────────────────────────────────────────

/// Single-producer encoder owned by the UI engine's redraw task.
pub struct FrameEncoder {
    depth: PixelDepth,
    canvas_width: u16,
    canvas_height: u16,
    max_region_pixels: usize,
    scratch: ScratchBuffer,
    frames_encoded: u64,
}

impl FrameEncoder {
    /// Create an encoder whose buffer fits a region of
    /// `max_region_pixels` at the widest pixel depth.
    pub fn new(
        depth: PixelDepth,
        canvas_width: u16,
        canvas_height: u16,
        max_region_pixels: usize,
    ) -> Self {
        let capacity = FrameHeader::SIZE + max_region_pixels * PixelDepth::MAX_BYTES_PER_PIXEL;
        Self {
            depth,
            canvas_width,
            canvas_height,
            max_region_pixels,
            scratch: ScratchBuffer::with_headroom(capacity, ws::MAX_HEADER_LEN),
            frames_encoded: 0,
        }
    }

    pub fn depth(&self) -> PixelDepth {
        self.depth
    }

    /// Body capacity of the scratch buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Number of frames encoded so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Largest region, in pixels, a single call may carry.
    pub fn max_region_pixels(&self) -> usize {
        self.max_region_pixels
    }

    /// Encode one flushed region.
    ///
    /// Fails without touching the previous message's framing when the
    /// region is malformed, the pixels do not match it, or the region is
    /// larger than `max_region_pixels` at any depth.
    pub fn encode(
        &mut self,
        area: Area,
        pixels: PixelBuffer<'_>,
    ) -> Result<EncodedFrame<'_>, BridgeError> {
        if pixels.depth() != self.depth {
            return Err(BridgeError::DepthMismatch {
                expected: self.depth.bits(),
                actual: pixels.depth().bits(),
            });
        }
        area.check_within(self.canvas_width, self.canvas_height)?;

        let count = area.pixel_count();
        if pixels.len() != count {
            return Err(BridgeError::PixelCountMismatch {
                expected: count,
                actual: pixels.len(),
            });
        }

        let bpp = self.depth.bytes_per_pixel();
        let required = FrameHeader::SIZE + count * bpp;
        if count > self.max_region_pixels {
            return Err(BridgeError::BufferTooSmall {
                required,
                capacity: FrameHeader::SIZE + self.max_region_pixels * bpp,
            });
        }
        if required > self.scratch.capacity() {
            return Err(BridgeError::BufferTooSmall {
                required,
                capacity: self.scratch.capacity(),
            });
        }

        self.scratch.clear();
        let header = FrameHeader {
            depth: self.depth,
            canvas_width: self.canvas_width,
            canvas_height: self.canvas_height,
            area,
        };
        header.write(&mut self.scratch)?;

        match pixels {
            PixelBuffer::Indexed8(p) => self.scratch.put_slice(p)?,
            PixelBuffer::Rgb565(p) => {
                for &px in p {
                    self.scratch.put_u16_be(px)?;
                }
            }
            PixelBuffer::Rgba8888(p) => {
                for px in p {
                    self.scratch.put_slice(&[px.r, px.g, px.b, px.a])?;
                }
            }
        }

        let mut prefix = [0u8; ws::MAX_HEADER_LEN];
        let n = ws::write_header(Opcode::Binary, self.scratch.len(), &mut prefix);
        self.scratch.prepend(&prefix[..n])?;
        self.frames_encoded += 1;

        Ok(EncodedFrame {
            wire: self.scratch.framed(),
            payload: self.scratch.body(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
