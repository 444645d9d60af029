//! The boundary between capture logic and the display server.
//!
//! [`DisplayConnector`] and [`DisplayConnection`] describe the handful of requests window
//! enumeration and capture sessions need. The X11 implementation lives in [`linux`]; anything
//! else implementing these traits (a scripted server in tests, for example) can drive the same
//! session state machine.

use crate::error::CaptureError;
use crate::util::{PixmapFormat, Size, WindowHandle, ImageLayout};

#[cfg(target_os = "linux")]
/// X11 implementation over xcb and SysV shared memory
pub mod linux;

#[cfg(target_os = "linux")]
pub(crate) use linux as platform_impl;

/// Root window properties that list top-level client windows
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientListProperty {
    /// `_NET_CLIENT_LIST_STACKING`, bottom-to-top stacking order
    Stacking,
    /// `_NET_CLIENT_LIST`, initial mapping order
    Mapping,
}

/// Window attributes as reported by the server
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WindowAttributes {
    pub size: Size,
    pub depth: u8,
    pub visual: u32,
    pub viewable: bool,
}

/// Server-side off-screen buffer holding a redirected window's contents
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PixmapHandle(pub u32);

/// Server-side id of a shared memory segment attached to a connection
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SegmentAttachment(pub u32);

/// Memory shared between this process and the display server.
///
/// Dropping the segment unmaps it and releases its system id.
pub trait SharedSegment {
    /// System id handed to the server on attach
    fn id(&self) -> i32;
    fn as_bytes(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens connections to a display server.
pub trait DisplayConnector {
    type Connection: DisplayConnection;

    fn connect(&self) -> Result<Self::Connection, CaptureError>;
}

/// A live connection. Dropping it closes the connection.
///
/// Query methods report a window that vanished or never existed as `Ok(None)`; `Err` is
/// reserved for failures of the request itself, most importantly a lost connection.
pub trait DisplayConnection {
    type Segment: SharedSegment;

    /// Read a client list property of the root window, `None` if the server doesn't set it
    fn client_list(&self, property: ClientListProperty) -> Result<Option<Vec<WindowHandle>>, CaptureError>;

    /// Window named by `_NET_WM_FRAME_WINDOW` on `window`, if any
    fn frame_relation(&self, window: WindowHandle) -> Result<Option<WindowHandle>, CaptureError>;

    /// Display title of `window`, `None` if it has none
    fn window_title(&self, window: WindowHandle) -> Result<Option<String>, CaptureError>;

    fn window_attributes(&self, window: WindowHandle) -> Result<Option<WindowAttributes>, CaptureError>;

    /// Whether the compositing extension is available
    fn has_compositing(&self) -> Result<bool, CaptureError>;

    /// Redirect `window` into off-screen storage, updated automatically by the server
    fn redirect_window(&self, window: WindowHandle) -> Result<(), CaptureError>;

    /// Name the pixmap currently backing a redirected window
    fn name_window_pixmap(&self, window: WindowHandle) -> Result<PixmapHandle, CaptureError>;

    fn free_pixmap(&self, pixmap: PixmapHandle);

    /// Pixel layout the server uses for images of `depth`
    fn pixmap_format(&self, depth: u8) -> Option<PixmapFormat>;

    fn allocate_segment(&self, len: usize) -> Result<Self::Segment, CaptureError>;

    fn attach_segment(&self, segment: &Self::Segment) -> Result<SegmentAttachment, CaptureError>;

    fn detach_segment(&self, attachment: SegmentAttachment);

    /// Have the server copy all of `pixmap` into `segment`, laid out as `layout`.
    ///
    /// On error the segment contents must be left as they were.
    fn get_image(
        &self,
        pixmap: PixmapHandle,
        layout: &ImageLayout,
        attachment: SegmentAttachment,
        segment: &mut Self::Segment,
    ) -> Result<(), CaptureError>;
}
