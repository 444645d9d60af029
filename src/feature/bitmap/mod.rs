#![cfg(feature = "bitmap")]

use crate::frame::{VideoCaptureFrame, VideoFrame};

/// Tightly packed BGRA pixels, one `[b, g, r, a]` per pixel, row after row
#[derive(Debug, Clone)]
pub struct FrameBitmapBgraUnorm8x4 {
    pub data: Box<[[u8; 4]]>,
    pub width:  usize,
    pub height: usize,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FrameBitmap {
    BgraUnorm8x4(FrameBitmapBgraUnorm8x4),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoFrameBitmapError {
    UnsupportedFormat { depth: u8, bits_per_pixel: u8 },
    Other(String),
}

impl std::fmt::Display for VideoFrameBitmapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedFormat { depth, bits_per_pixel } => f.write_fmt(format_args!("VideoFrameBitmapError::UnsupportedFormat(depth {}, {} bpp)", depth, bits_per_pixel)),
            Self::Other(message) => f.write_fmt(format_args!("VideoFrameBitmapError::Other(\"{}\")", message)),
        }
    }
}

impl std::error::Error for VideoFrameBitmapError {}

/// Copy a captured frame out of shared memory into an owned bitmap
pub trait VideoFrameBitmap {
    fn get_bitmap(&self) -> Result<FrameBitmap, VideoFrameBitmapError>;
}

impl VideoFrameBitmap for VideoFrame<'_> {
    fn get_bitmap(&self) -> Result<FrameBitmap, VideoFrameBitmapError> {
        if self.bits_per_pixel() != 32 {
            return Err(VideoFrameBitmapError::UnsupportedFormat { depth: self.depth(), bits_per_pixel: self.bits_per_pixel() });
        }
        let width = self.size().width as usize;
        let height = self.size().height as usize;
        // Below depth 32 the fourth byte is padding, not alpha
        let opaque = self.depth() < 32;
        let mut image_data = vec![[0u8; 4]; width * height];
        let mut rows_copied = 0;
        for (y, row) in self.rows().enumerate() {
            let source_slice = bytemuck::cast_slice::<_, [u8; 4]>(row);
            let dest_slice = &mut image_data[(width * y)..(width * y + width)];
            dest_slice.copy_from_slice(source_slice);
            if opaque {
                dest_slice.iter_mut().for_each(|pixel| pixel[3] = 255);
            }
            rows_copied += 1;
        }
        if rows_copied != height {
            return Err(VideoFrameBitmapError::Other("frame is shorter than its layout".into()));
        }
        Ok(FrameBitmap::BgraUnorm8x4(FrameBitmapBgraUnorm8x4 {
            data: image_data.into_boxed_slice(),
            width,
            height,
        }))
    }
}
