use std::fmt::Display;

use crate::error::CaptureError;

/// Identifies a window on the display server. Not owned; the server may destroy it at any time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl WindowHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl From<u32> for WindowHandle {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("0x{:08x}", self.0))
    }
}

/// Represents a 2D size in pixels
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<Size> for (u32, u32) {
    fn from(size: Size) -> Self {
        (size.width, size.height)
    }
}

/// How the server lays out pixels of a given depth in a ZPixmap image
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixmapFormat {
    pub depth: u8,
    pub bits_per_pixel: u8,
    /// Row alignment, in bits
    pub scanline_pad: u8,
}

/// Client-side description of the image the server copies frames into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageLayout {
    size: Size,
    depth: u8,
    bits_per_pixel: u8,
    stride: usize,
}

impl ImageLayout {
    /// Lay out a `size` image using the row padding rules of `format`.
    pub fn new(size: Size, format: PixmapFormat) -> Result<Self, CaptureError> {
        if size.is_empty() {
            return Err(CaptureError::Resource(format!("cannot lay out an empty {}x{} image", size.width, size.height)));
        }
        if format.bits_per_pixel == 0 || format.scanline_pad == 0 || format.scanline_pad % 8 != 0 {
            return Err(CaptureError::Resource(format!("unusable pixmap format for depth {}: {:?}", format.depth, format)));
        }
        let pad = format.scanline_pad as usize;
        let row_bits = (size.width as usize)
            .checked_mul(format.bits_per_pixel as usize)
            .ok_or_else(|| CaptureError::Resource("image row size overflows".into()))?;
        let stride = row_bits.div_ceil(pad) * pad / 8;
        stride
            .checked_mul(size.height as usize)
            .ok_or_else(|| CaptureError::Resource("image size overflows".into()))?;
        Ok(Self {
            size,
            depth: format.depth,
            bits_per_pixel: format.bits_per_pixel,
            stride,
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn bits_per_pixel(&self) -> u8 {
        self.bits_per_pixel
    }

    /// Bytes per row, including padding
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes of pixel data in one row, excluding padding
    pub fn row_bytes(&self) -> usize {
        (self.size.width as usize * self.bits_per_pixel as usize).div_ceil(8)
    }

    /// Total bytes needed to back the image
    pub fn byte_len(&self) -> usize {
        self.stride * self.size.height as usize
    }
}
