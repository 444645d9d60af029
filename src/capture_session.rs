//! Capture of a single window through Composite redirection and shared memory.
//!
//! A [`CaptureSession`] is either closed or fully open. Opening acquires, in order, a server
//! connection, an automatic redirection of the target window, a named pixmap of its off-screen
//! contents, an image layout at the window's depth, and a shared memory segment attached to the
//! server. Everything acquired is held by a `SessionResources` value whose destructor hands
//! it back in reverse order, so an `open` that fails halfway, an explicit `close`, and dropping
//! the session all release the same way.

use std::time::Instant;

use tracing::{debug, trace};

use crate::capturable_content::resolve_client_window;
use crate::error::CaptureError;
use crate::frame::VideoFrame;
use crate::platform::{DisplayConnection, DisplayConnector, PixmapHandle, SegmentAttachment, SharedSegment};
use crate::util::{ImageLayout, Size, WindowHandle};

/// Server and shared memory resources held by an open (or opening) session.
struct SessionResources<C: DisplayConnection> {
    connection: C,
    pixmap: Option<PixmapHandle>,
    segment: Option<C::Segment>,
    attachment: Option<SegmentAttachment>,
}

impl<C: DisplayConnection> SessionResources<C> {
    fn new(connection: C) -> Self {
        Self {
            connection,
            pixmap: None,
            segment: None,
            attachment: None,
        }
    }
}

impl<C: DisplayConnection> Drop for SessionResources<C> {
    fn drop(&mut self) {
        if let Some(pixmap) = self.pixmap.take() {
            self.connection.free_pixmap(pixmap);
        }
        if let Some(attachment) = self.attachment.take() {
            self.connection.detach_segment(attachment);
        }
        // Unmaps and removes the segment id
        drop(self.segment.take());
        // The connection closes when the field itself is dropped
    }
}

struct CapturedFrame {
    frame_id: u64,
    capture_time: Instant,
}

struct OpenSession<C: DisplayConnection> {
    resources: SessionResources<C>,
    window: WindowHandle,
    layout: ImageLayout,
    frames_captured: u64,
    last_frame: Option<CapturedFrame>,
}

impl<C: DisplayConnection> OpenSession<C> {
    fn open(connection: C, window: WindowHandle) -> Result<Self, CaptureError> {
        let target = resolve_client_window(&connection, window)?;
        let attributes = connection.window_attributes(target)?
            .ok_or_else(|| CaptureError::WindowQuery {
                window: target,
                reason: "window does not exist or its attributes are unreadable".into(),
            })?;
        debug!(window = %target, width = attributes.size.width, height = attributes.size.height, depth = attributes.depth, "capture target resolved");

        if !connection.has_compositing()? {
            return Err(CaptureError::UnsupportedServer("Composite extension (0.2 or later) is not available".into()));
        }

        // From here on every acquisition lands in `resources`, released on early return
        let mut resources = SessionResources::new(connection);
        resources.connection.redirect_window(target)?;
        resources.pixmap = Some(resources.connection.name_window_pixmap(target)?);

        let format = resources.connection.pixmap_format(attributes.depth)
            .ok_or_else(|| CaptureError::Resource(format!("server has no pixmap format for depth {}", attributes.depth)))?;
        let layout = ImageLayout::new(attributes.size, format)?;

        let segment = resources.segment.insert(resources.connection.allocate_segment(layout.byte_len())?);
        debug!(bytes = segment.len(), stride = layout.stride(), "shared memory segment mapped");
        resources.attachment = Some(resources.connection.attach_segment(segment)?);

        Ok(Self {
            resources,
            window: target,
            layout,
            frames_captured: 0,
            last_frame: None,
        })
    }

    fn refresh(&mut self) -> Result<(), CaptureError> {
        let resources = &mut self.resources;
        // The previous pixmap goes stale whenever the window is resized or remapped
        let pixmap = resources.connection.name_window_pixmap(self.window)?;
        if let Some(previous) = resources.pixmap.replace(pixmap) {
            resources.connection.free_pixmap(previous);
        }
        let (Some(segment), Some(attachment)) = (resources.segment.as_mut(), resources.attachment) else {
            return Err(CaptureError::InvalidState("session has no attached shared memory"));
        };
        resources.connection.get_image(pixmap, &self.layout, attachment, segment)?;

        self.frames_captured += 1;
        self.last_frame = Some(CapturedFrame {
            frame_id: self.frames_captured,
            capture_time: Instant::now(),
        });
        trace!(window = %self.window, frame_id = self.frames_captured, "frame captured");
        Ok(())
    }

    fn frame(&self) -> Option<VideoFrame<'_>> {
        let captured = self.last_frame.as_ref()?;
        let segment = self.resources.segment.as_ref()?;
        let data = segment.as_bytes().get(..self.layout.byte_len())?;
        Some(VideoFrame {
            data,
            layout: self.layout,
            frame_id: captured.frame_id,
            capture_time: captured.capture_time,
        })
    }
}

enum SessionState<C: DisplayConnection> {
    Closed,
    Open(OpenSession<C>),
}

/// Captures frames of one window.
///
/// ```no_run
/// use crabeye::prelude::*;
///
/// # fn main() -> Result<(), CaptureError> {
/// let config = CaptureConfig::default();
/// let window = list_visible_windows(&config)?.remove(0);
/// let mut session = CaptureSession::new(&config);
/// session.open(window.handle())?;
/// session.refresh()?;
/// let pixels = session.raw_buffer().unwrap();
/// assert_eq!(pixels.len(), session.stride() * session.size().height as usize);
/// session.close();
/// # Ok(())
/// # }
/// ```
pub struct CaptureSession<K: DisplayConnector> {
    connector: K,
    state: SessionState<K::Connection>,
}

#[cfg(target_os = "linux")]
impl CaptureSession<crate::platform::platform_impl::X11Connector> {
    /// A closed session that will connect to the X display named in `config`
    pub fn new(config: &crate::config::CaptureConfig) -> Self {
        Self::with_connector(crate::platform::platform_impl::X11Connector::new(config))
    }
}

impl<K: DisplayConnector> CaptureSession<K> {
    pub fn with_connector(connector: K) -> Self {
        Self {
            connector,
            state: SessionState::Closed,
        }
    }

    /// Connect and acquire everything needed to capture `window`.
    ///
    /// `window` may be a window manager frame; its client window is captured. On error the
    /// session stays closed and nothing acquired along the way survives.
    pub fn open(&mut self, window: WindowHandle) -> Result<(), CaptureError> {
        if self.is_open() {
            return Err(CaptureError::InvalidState("session is already open"));
        }
        let connection = self.connector.connect()?;
        let session = OpenSession::open(connection, window)?;
        debug!(window = %session.window, "capture session open");
        self.state = SessionState::Open(session);
        Ok(())
    }

    /// Copy the window's current contents into shared memory.
    ///
    /// Blocks for one server round trip. If this fails, the previous frame stays readable and
    /// unchanged.
    pub fn refresh(&mut self) -> Result<(), CaptureError> {
        match &mut self.state {
            SessionState::Open(session) => session.refresh(),
            SessionState::Closed => Err(CaptureError::InvalidState("refresh on a closed session")),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// The captured client window, if open
    pub fn window(&self) -> Option<WindowHandle> {
        match &self.state {
            SessionState::Open(session) => Some(session.window),
            SessionState::Closed => None,
        }
    }

    /// Frame size fixed at open time, zero when closed
    pub fn size(&self) -> Size {
        match &self.state {
            SessionState::Open(session) => session.layout.size(),
            SessionState::Closed => Size::ZERO,
        }
    }

    /// Bytes per frame row, zero when closed
    pub fn stride(&self) -> usize {
        match &self.state {
            SessionState::Open(session) => session.layout.stride(),
            SessionState::Closed => 0,
        }
    }

    pub fn layout(&self) -> Option<ImageLayout> {
        match &self.state {
            SessionState::Open(session) => Some(session.layout),
            SessionState::Closed => None,
        }
    }

    /// Pixels of the last successful refresh, `stride() * height` bytes.
    ///
    /// `None` before the first successful refresh and once closed.
    pub fn raw_buffer(&self) -> Option<&[u8]> {
        self.frame().map(|frame| frame.data())
    }

    /// The last successful refresh with its layout and timing
    pub fn frame(&self) -> Option<VideoFrame<'_>> {
        match &self.state {
            SessionState::Open(session) => session.frame(),
            SessionState::Closed => None,
        }
    }

    /// Release everything the session holds. Closing a closed session does nothing.
    pub fn close(&mut self) {
        if let SessionState::Open(session) = std::mem::replace(&mut self.state, SessionState::Closed) {
            debug!(window = %session.window, frames = session.frames_captured, "closing capture session");
        }
    }
}

impl<K: DisplayConnector> Drop for CaptureSession<K> {
    fn drop(&mut self) {
        self.close();
    }
}
