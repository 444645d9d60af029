use std::time::Instant;

use crate::util::*;

/// Common accessors for a captured frame
pub trait VideoCaptureFrame {
    fn size(&self) -> Size;
    fn stride(&self) -> usize;
    fn depth(&self) -> u8;
    fn bits_per_pixel(&self) -> u8;
    fn capture_time(&self) -> Instant;
    fn frame_id(&self) -> u64;
}

/// The most recent frame of a capture session, borrowed from its shared memory.
///
/// Pixels are in the server's native ZPixmap layout. For 24 and 32 bit depths on little-endian
/// servers that is BGRX/BGRA, four bytes per pixel, rows `stride()` bytes apart.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'session> {
    pub(crate) data: &'session [u8],
    pub(crate) layout: ImageLayout,
    pub(crate) frame_id: u64,
    pub(crate) capture_time: Instant,
}

impl<'session> VideoFrame<'session> {
    /// All rows, including row padding
    pub fn data(&self) -> &'session [u8] {
        self.data
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Pixel bytes of row `y`, without padding
    pub fn row(&self, y: u32) -> Option<&'session [u8]> {
        if y >= self.layout.size().height {
            return None;
        }
        let start = y as usize * self.layout.stride();
        self.data.get(start..start + self.layout.row_bytes())
    }

    pub fn rows(&self) -> impl Iterator<Item = &'session [u8]> + 'session {
        let row_bytes = self.layout.row_bytes();
        self.data
            .chunks_exact(self.layout.stride())
            .take(self.layout.size().height as usize)
            .map(move |row| &row[..row_bytes])
    }
}

impl VideoCaptureFrame for VideoFrame<'_> {
    fn size(&self) -> Size {
        self.layout.size()
    }

    fn stride(&self) -> usize {
        self.layout.stride()
    }

    fn depth(&self) -> u8 {
        self.layout.depth()
    }

    fn bits_per_pixel(&self) -> u8 {
        self.layout.bits_per_pixel()
    }

    fn capture_time(&self) -> Instant {
        self.capture_time
    }

    fn frame_id(&self) -> u64 {
        self.frame_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_skip_padding() {
        let layout = ImageLayout::new(Size::new(3, 2), PixmapFormat { depth: 16, bits_per_pixel: 16, scanline_pad: 32 }).unwrap();
        let data: Vec<u8> = (0..16).collect();
        let frame = VideoFrame { data: &data, layout, frame_id: 1, capture_time: Instant::now() };
        let rows: Vec<&[u8]> = frame.rows().collect();
        assert_eq!(rows, vec![&[0u8, 1, 2, 3, 4, 5][..], &[8u8, 9, 10, 11, 12, 13][..]]);
        assert_eq!(frame.row(1), Some(&[8u8, 9, 10, 11, 12, 13][..]));
        assert_eq!(frame.row(2), None);
    }
}
