#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use crabeye::error::CaptureError;
use crabeye::platform::*;
use crabeye::util::{ImageLayout, PixmapFormat, Size, WindowHandle};
use parking_lot::Mutex;

/// A step of session setup or capture that can be made to fail
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailurePoint {
    Connect,
    Composite,
    Redirect,
    NamePixmap,
    AllocateSegment,
    AttachSegment,
    GetImage,
    /// The connection breaks once the compositing check has passed
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct ScriptedWindow {
    pub title: Option<String>,
    pub size: Size,
    pub depth: u8,
    pub viewable: bool,
}

impl ScriptedWindow {
    pub fn new(title: &str, width: u32, height: u32) -> Self {
        Self {
            title: Some(title.to_string()),
            size: Size::new(width, height),
            depth: 24,
            viewable: true,
        }
    }

    pub fn untitled(mut self) -> Self {
        self.title = None;
        self
    }

    pub fn unmapped(mut self) -> Self {
        self.viewable = false;
        self
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }
}

/// Live server-side and client-side resources, for leak checks
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCounts {
    pub connections: usize,
    pub pixmaps: usize,
    pub segments: usize,
    pub attachments: usize,
}

impl ResourceCounts {
    pub fn is_zero(&self) -> bool {
        *self == ResourceCounts::default()
    }
}

#[derive(Default)]
pub struct ServerState {
    pub stacking: Option<Vec<WindowHandle>>,
    pub client_list: Option<Vec<WindowHandle>>,
    pub windows: HashMap<WindowHandle, ScriptedWindow>,
    pub frames: HashMap<WindowHandle, WindowHandle>,
    pub composite: bool,
    pub failures: Vec<FailurePoint>,
    pub live: ResourceCounts,
    pub frames_served: u8,
    next_id: u32,
    released_pixmaps: Vec<PixmapHandle>,
    release_log: Vec<&'static str>,
}

impl ServerState {
    fn fail(&self, point: FailurePoint) -> bool {
        self.failures.contains(&point)
    }

    fn check_connection(&self, request: &str) -> Result<(), CaptureError> {
        if self.fail(FailurePoint::Disconnect) {
            return Err(CaptureError::Connection(format!("{}: connection to scripted server lost", request)));
        }
        Ok(())
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        0x0040_0000 + self.next_id
    }
}

/// An in-memory display server driven by a script, standing in for an X server.
#[derive(Clone)]
pub struct ScriptedServer {
    state: Arc<Mutex<ServerState>>,
}

impl ScriptedServer {
    pub fn new() -> Self {
        let server = Self { state: Arc::new(Mutex::new(ServerState::default())) };
        server.state.lock().composite = true;
        server
    }

    /// Add a top-level window to both client lists
    pub fn add_window(&self, id: u32, window: ScriptedWindow) -> WindowHandle {
        let handle = WindowHandle(id);
        let mut state = self.state.lock();
        state.windows.insert(handle, window);
        state.stacking.get_or_insert_with(Vec::new).push(handle);
        state.client_list.get_or_insert_with(Vec::new).push(handle);
        handle
    }

    /// Make `frame` resolve to `client` through the frame relation
    pub fn add_frame(&self, frame: u32, client: WindowHandle) -> WindowHandle {
        let frame = WindowHandle(frame);
        let mut state = self.state.lock();
        state.frames.insert(frame, client);
        state.stacking.get_or_insert_with(Vec::new).push(frame);
        state.client_list.get_or_insert_with(Vec::new).push(frame);
        frame
    }

    pub fn fail_at(&self, point: FailurePoint) {
        self.state.lock().failures.push(point);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn live(&self) -> ResourceCounts {
        self.state.lock().live
    }

    pub fn release_log(&self) -> Vec<&'static str> {
        self.state.lock().release_log.clone()
    }

    pub fn released_pixmaps(&self) -> Vec<PixmapHandle> {
        self.state.lock().released_pixmaps.clone()
    }
}

impl DisplayConnector for ScriptedServer {
    type Connection = ScriptedConnection;

    fn connect(&self) -> Result<ScriptedConnection, CaptureError> {
        let mut state = self.state.lock();
        if state.fail(FailurePoint::Connect) {
            return Err(CaptureError::Connection("scripted server refuses connections".into()));
        }
        state.live.connections += 1;
        Ok(ScriptedConnection { state: self.state.clone() })
    }
}

pub struct ScriptedConnection {
    state: Arc<Mutex<ServerState>>,
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live.connections -= 1;
        state.release_log.push("connection");
    }
}

pub struct ScriptedSegment {
    id: i32,
    data: Vec<u8>,
    state: Arc<Mutex<ServerState>>,
}

impl SharedSegment for ScriptedSegment {
    fn id(&self) -> i32 {
        self.id
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for ScriptedSegment {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live.segments -= 1;
        state.release_log.push("segment");
    }
}

impl DisplayConnection for ScriptedConnection {
    type Segment = ScriptedSegment;

    fn client_list(&self, property: ClientListProperty) -> Result<Option<Vec<WindowHandle>>, CaptureError> {
        let state = self.state.lock();
        Ok(match property {
            ClientListProperty::Stacking => state.stacking.clone(),
            ClientListProperty::Mapping => state.client_list.clone(),
        })
    }

    fn frame_relation(&self, window: WindowHandle) -> Result<Option<WindowHandle>, CaptureError> {
        Ok(self.state.lock().frames.get(&window).copied())
    }

    fn window_title(&self, window: WindowHandle) -> Result<Option<String>, CaptureError> {
        Ok(self.state.lock().windows.get(&window).and_then(|window| window.title.clone()))
    }

    fn window_attributes(&self, window: WindowHandle) -> Result<Option<WindowAttributes>, CaptureError> {
        Ok(self.state.lock().windows.get(&window).map(|window| WindowAttributes {
            size: window.size,
            depth: window.depth,
            visual: 0x21,
            viewable: window.viewable,
        }))
    }

    fn has_compositing(&self) -> Result<bool, CaptureError> {
        let state = self.state.lock();
        Ok(state.composite && !state.fail(FailurePoint::Composite))
    }

    fn redirect_window(&self, window: WindowHandle) -> Result<(), CaptureError> {
        let state = self.state.lock();
        state.check_connection("RedirectWindow")?;
        if state.fail(FailurePoint::Redirect) {
            return Err(CaptureError::Connection(format!("connection lost redirecting {}", window)));
        }
        Ok(())
    }

    fn name_window_pixmap(&self, window: WindowHandle) -> Result<PixmapHandle, CaptureError> {
        let mut state = self.state.lock();
        state.check_connection("NameWindowPixmap")?;
        let viewable = state.windows.get(&window).map(|window| window.viewable).unwrap_or(false);
        if state.fail(FailurePoint::NamePixmap) || !viewable {
            return Err(CaptureError::Acquisition(format!("no pixmap for window {}", window)));
        }
        state.live.pixmaps += 1;
        let id = state.next_id();
        Ok(PixmapHandle(id))
    }

    fn free_pixmap(&self, pixmap: PixmapHandle) {
        let mut state = self.state.lock();
        state.live.pixmaps -= 1;
        state.released_pixmaps.push(pixmap);
        state.release_log.push("pixmap");
    }

    fn pixmap_format(&self, depth: u8) -> Option<PixmapFormat> {
        match depth {
            24 | 32 => Some(PixmapFormat { depth, bits_per_pixel: 32, scanline_pad: 32 }),
            16 => Some(PixmapFormat { depth, bits_per_pixel: 16, scanline_pad: 32 }),
            _ => None,
        }
    }

    fn allocate_segment(&self, len: usize) -> Result<ScriptedSegment, CaptureError> {
        let mut state = self.state.lock();
        if state.fail(FailurePoint::AllocateSegment) {
            return Err(CaptureError::Resource("scripted shmget failure".into()));
        }
        state.live.segments += 1;
        let id = state.next_id() as i32;
        Ok(ScriptedSegment { id, data: vec![0; len], state: self.state.clone() })
    }

    fn attach_segment(&self, segment: &ScriptedSegment) -> Result<SegmentAttachment, CaptureError> {
        let mut state = self.state.lock();
        state.check_connection("ShmAttach")?;
        if state.fail(FailurePoint::AttachSegment) {
            return Err(CaptureError::Acquisition(format!("attach of segment {} refused", segment.id())));
        }
        state.live.attachments += 1;
        let id = state.next_id();
        Ok(SegmentAttachment(id))
    }

    fn detach_segment(&self, _attachment: SegmentAttachment) {
        let mut state = self.state.lock();
        state.live.attachments -= 1;
        state.release_log.push("attachment");
    }

    fn get_image(
        &self,
        _pixmap: PixmapHandle,
        layout: &ImageLayout,
        _attachment: SegmentAttachment,
        segment: &mut ScriptedSegment,
    ) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.fail(FailurePoint::GetImage) {
            return Err(CaptureError::Transfer("scripted GetImage failure".into()));
        }
        state.frames_served = state.frames_served.wrapping_add(1);
        let fill = state.frames_served;
        segment.data[..layout.byte_len()].fill(fill);
        Ok(())
    }
}
