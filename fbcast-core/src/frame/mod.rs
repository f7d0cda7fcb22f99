//! Frame messages: one flushed pixel region per message.
//!
//! ## Wire format
//!
//! ```text
//! depth:   u8   (8 | 16 | 32)
//! width:   u16  canvas width, big-endian
//! height:  u16  canvas height, big-endian
//! x1:      u16  region, inclusive, big-endian
//! y1:      u16
//! x2:      u16
//! y2:      u16
//! pixels:  [u8] row-major, left-to-right
//! ```
//!
//! Pixel packing: 32 bpp as `r, g, b, a`; 16 bpp as the RGB565 word,
//! high byte first; 8 bpp as the raw packed byte.

pub mod encoder;
pub mod scratch;

pub use encoder::{EncodedFrame, FrameEncoder};
pub use scratch::ScratchBuffer;

use crate::error::BridgeError;

// ── PixelDepth ───────────────────────────────────────────────────

/// Color depth the UI engine renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelDepth {
    /// 1 byte per pixel (RGB332 or palette index).
    Indexed8,
    /// 2 bytes per pixel, RGB565.
    Rgb565,
    /// 4 bytes per pixel, RGBA8888.
    Rgba8888,
}

impl PixelDepth {
    /// Widest pixel any depth produces.
    pub const MAX_BYTES_PER_PIXEL: usize = 4;

    /// Bytes consumed by a single pixel on the wire.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelDepth::Indexed8 => 1,
            PixelDepth::Rgb565 => 2,
            PixelDepth::Rgba8888 => 4,
        }
    }

    /// The depth tag written as the first byte of a frame message.
    pub const fn bits(self) -> u8 {
        match self {
            PixelDepth::Indexed8 => 8,
            PixelDepth::Rgb565 => 16,
            PixelDepth::Rgba8888 => 32,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self, BridgeError> {
        match bits {
            8 => Ok(PixelDepth::Indexed8),
            16 => Ok(PixelDepth::Rgb565),
            32 => Ok(PixelDepth::Rgba8888),
            other => Err(BridgeError::UnknownDepth(other)),
        }
    }
}

// ── Area ─────────────────────────────────────────────────────────

/// A dirty rectangle with inclusive corners, as UI engines report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

impl Area {
    pub const fn new(x1: u16, y1: u16, x2: u16, y2: u16) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The whole canvas.
    pub const fn full(width: u16, height: u16) -> Self {
        Self::new(0, 0, width.saturating_sub(1), height.saturating_sub(1))
    }

    /// Width in pixels. Zero for an inverted area.
    pub fn width(&self) -> usize {
        if self.x2 < self.x1 {
            0
        } else {
            (self.x2 - self.x1) as usize + 1
        }
    }

    /// Height in pixels. Zero for an inverted area.
    pub fn height(&self) -> usize {
        if self.y2 < self.y1 {
            0
        } else {
            (self.y2 - self.y1) as usize + 1
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    /// Smallest area covering both `self` and `other`.
    pub fn union(&self, other: &Area) -> Area {
        Area {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Ensure the area is well-formed and lies inside a `width × height` canvas.
    pub fn check_within(&self, width: u16, height: u16) -> Result<(), BridgeError> {
        if self.x2 < self.x1 || self.y2 < self.y1 {
            return Err(BridgeError::InvalidRegion("inverted corners"));
        }
        if self.x2 >= width || self.y2 >= height {
            return Err(BridgeError::InvalidRegion("outside the canvas"));
        }
        Ok(())
    }
}

// ── Pixels ───────────────────────────────────────────────────────

/// One 32-bit pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    /// Pack into a 16-bit RGB565 word.
    pub const fn to_rgb565(self) -> u16 {
        ((self.r as u16 & 0xF8) << 8) | ((self.g as u16 & 0xFC) << 3) | (self.b as u16 >> 3)
    }

    /// Pack into an 8-bit RGB332 byte.
    pub const fn to_rgb332(self) -> u8 {
        (self.r & 0xE0) | ((self.g & 0xE0) >> 3) | (self.b >> 6)
    }
}

/// Borrowed pixel source for one flushed region.
///
/// The variant fixes the pixel depth; the UI engine's draw buffer stays
/// untouched for the duration of the flush.
#[derive(Debug, Clone, Copy)]
pub enum PixelBuffer<'a> {
    Indexed8(&'a [u8]),
    Rgb565(&'a [u16]),
    Rgba8888(&'a [Rgba]),
}

impl PixelBuffer<'_> {
    pub fn depth(&self) -> PixelDepth {
        match self {
            PixelBuffer::Indexed8(_) => PixelDepth::Indexed8,
            PixelBuffer::Rgb565(_) => PixelDepth::Rgb565,
            PixelBuffer::Rgba8888(_) => PixelDepth::Rgba8888,
        }
    }

    /// Number of pixels held.
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Indexed8(p) => p.len(),
            PixelBuffer::Rgb565(p) => p.len(),
            PixelBuffer::Rgba8888(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned pixels recovered from a frame message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPixels {
    Indexed8(Vec<u8>),
    Rgb565(Vec<u16>),
    Rgba8888(Vec<Rgba>),
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Fixed-size header in front of every frame message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub depth: PixelDepth,
    pub canvas_width: u16,
    pub canvas_height: u16,
    pub area: Area,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 13;

    /// Append the header to `out`, failing instead of overrunning it.
    pub fn write(&self, out: &mut ScratchBuffer) -> Result<(), BridgeError> {
        out.put_u8(self.depth.bits())?;
        out.put_u16_be(self.canvas_width)?;
        out.put_u16_be(self.canvas_height)?;
        out.put_u16_be(self.area.x1)?;
        out.put_u16_be(self.area.y1)?;
        out.put_u16_be(self.area.x2)?;
        out.put_u16_be(self.area.y2)
    }

    /// Deserialize from the front of a frame message.
    pub fn decode(data: &[u8]) -> Result<Self, BridgeError> {
        if data.len() < Self::SIZE {
            return Err(BridgeError::TruncatedFrame {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let be = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]);
        Ok(Self {
            depth: PixelDepth::from_bits(data[0])?,
            canvas_width: be(1),
            canvas_height: be(3),
            area: Area::new(be(5), be(7), be(9), be(11)),
        })
    }
}

// ── DecodedFrame ─────────────────────────────────────────────────

/// A frame message parsed back into its parts, as a viewer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    pub pixels: DecodedPixels,
}

impl DecodedFrame {
    /// Parse an unframed frame message.
    pub fn decode(data: &[u8]) -> Result<Self, BridgeError> {
        let header = FrameHeader::decode(data)?;
        let count = header.area.pixel_count();
        let expected = FrameHeader::SIZE + count * header.depth.bytes_per_pixel();
        if data.len() != expected {
            return Err(BridgeError::TruncatedFrame {
                expected,
                actual: data.len(),
            });
        }

        let body = &data[FrameHeader::SIZE..];
        let pixels = match header.depth {
            PixelDepth::Indexed8 => DecodedPixels::Indexed8(body.to_vec()),
            PixelDepth::Rgb565 => DecodedPixels::Rgb565(
                body.chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            ),
            PixelDepth::Rgba8888 => DecodedPixels::Rgba8888(
                body.chunks_exact(4)
                    .map(|c| Rgba::new(c[0], c[1], c[2], c[3]))
                    .collect(),
            ),
        };

        Ok(Self { header, pixels })
    }
}

// ── Tests ────────────────────────────────────────────────────────
