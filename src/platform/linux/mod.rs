use tracing::{debug, warn};
use xcb::{composite, shm, x, Xid, XidNew};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::platform::{ClientListProperty, DisplayConnection, DisplayConnector, PixmapHandle, SegmentAttachment, SharedSegment, WindowAttributes};
use crate::util::{ImageLayout, PixmapFormat, Size, WindowHandle};

mod segment;

pub use segment::SysvSegment;

/// Opens xcb connections to an X server with the Composite and MIT-SHM extensions enabled.
#[derive(Debug, Clone, Default)]
pub struct X11Connector {
    display_name: Option<String>,
}

impl X11Connector {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            display_name: config.display_name.clone(),
        }
    }
}

impl DisplayConnector for X11Connector {
    type Connection = X11Connection;

    fn connect(&self) -> Result<X11Connection, CaptureError> {
        let (conn, screen_num) = xcb::Connection::connect_with_extensions(
            self.display_name.as_deref(),
            &[],
            &[xcb::Extension::Composite, xcb::Extension::Shm],
        ).map_err(|error| CaptureError::Connection(error.to_string()))?;
        let setup = conn.get_setup();
        let root = setup.roots()
            .nth(screen_num as usize)
            .map(|screen| screen.root())
            .ok_or_else(|| CaptureError::Connection(format!("screen {} missing from setup", screen_num)))?;
        let pixmap_formats = setup.pixmap_formats().iter().map(|format| PixmapFormat {
            depth: format.depth(),
            bits_per_pixel: format.bits_per_pixel(),
            scanline_pad: format.scanline_pad(),
        }).collect();
        let atoms = Atoms::intern(&conn)?;
        debug!(display = ?self.display_name, screen = screen_num, "connected to X server");
        Ok(X11Connection { conn, root, atoms, pixmap_formats })
    }
}

#[derive(Debug, Copy, Clone)]
struct Atoms {
    client_list_stacking: x::Atom,
    client_list: x::Atom,
    frame_window: x::Atom,
    wm_name: x::Atom,
    utf8_string: x::Atom,
}

impl Atoms {
    fn intern(conn: &xcb::Connection) -> Result<Self, CaptureError> {
        let names: [&[u8]; 5] = [
            b"_NET_CLIENT_LIST_STACKING",
            b"_NET_CLIENT_LIST",
            b"_NET_WM_FRAME_WINDOW",
            b"_NET_WM_NAME",
            b"UTF8_STRING",
        ];
        let cookies = names.map(|name| conn.send_request(&x::InternAtom {
            only_if_exists: true,
            name,
        }));
        let mut atoms = [x::ATOM_NONE; 5];
        for (atom, cookie) in atoms.iter_mut().zip(cookies) {
            *atom = conn.wait_for_reply(cookie).map_err(|error| connection_error(error, "intern atom"))?.atom();
        }
        let [client_list_stacking, client_list, frame_window, wm_name, utf8_string] = atoms;
        Ok(Self { client_list_stacking, client_list, frame_window, wm_name, utf8_string })
    }
}

/// An open xcb connection plus what was learned about the server at connect time.
pub struct X11Connection {
    conn: xcb::Connection,
    root: x::Window,
    atoms: Atoms,
    pixmap_formats: Vec<PixmapFormat>,
}

fn connection_error(error: xcb::Error, request: &str) -> CaptureError {
    match error {
        xcb::Error::Connection(error) => CaptureError::Connection(format!("{}: {}", request, error)),
        other => CaptureError::Connection(format!("{}: unexpected error {:?}", request, other)),
    }
}

/// Settle the outcome of a checked request against the connection state.
///
/// `xcb_request_check` reports success for every request once the connection has failed, so a
/// broken connection wins over whatever the check said.
fn settle_checked<E>(checked: Result<(), E>, connection: xcb::ConnResult<()>, request: &str) -> Result<Result<(), E>, CaptureError> {
    connection.map_err(|error| CaptureError::Connection(format!("{}: {}", request, error)))?;
    Ok(checked)
}

/// Prefer a non-blank `_NET_WM_NAME`, otherwise fall back to `WM_NAME`.
///
/// A blank `_NET_WM_NAME` is still reported when `WM_NAME` is missing, since the window does
/// carry a title property.
fn choose_title(
    net_name: Option<String>,
    legacy_name: impl FnOnce() -> Result<Option<String>, CaptureError>,
) -> Result<Option<String>, CaptureError> {
    match net_name {
        Some(name) if !name.trim().is_empty() => Ok(Some(name)),
        net_name => Ok(legacy_name()?.or(net_name)),
    }
}

fn xwindow(window: WindowHandle) -> x::Window {
    x::Window::new(window.0)
}

fn xpixmap(pixmap: PixmapHandle) -> x::Pixmap {
    x::Pixmap::new(pixmap.0)
}

fn xseg(attachment: SegmentAttachment) -> shm::Seg {
    shm::Seg::new(attachment.0)
}

/// Decode a text property according to its declared type
fn decode_text(bytes: &[u8], latin1: bool) -> String {
    let bytes = match bytes.iter().position(|byte| *byte == 0) {
        Some(nul) => &bytes[..nul],
        None => bytes,
    };
    if latin1 {
        bytes.iter().map(|byte| *byte as char).collect()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl X11Connection {
    /// Read a property of `window`. A missing window reads as `None`.
    fn property(&self, window: x::Window, property: x::Atom, r#type: x::Atom) -> Result<Option<x::GetPropertyReply>, CaptureError> {
        if property == x::ATOM_NONE {
            return Ok(None);
        }
        let cookie = self.conn.send_request(&x::GetProperty {
            delete: false,
            window,
            property,
            r#type,
            long_offset: 0,
            long_length: u32::MAX,
        });
        match self.conn.wait_for_reply(cookie) {
            Ok(reply) if reply.r#type() == x::ATOM_NONE => Ok(None),
            Ok(reply) => Ok(Some(reply)),
            Err(xcb::Error::Protocol(error)) => {
                debug!(window = window.resource_id(), ?error, "property read failed");
                Ok(None)
            },
            Err(error) => Err(connection_error(error, "GetProperty")),
        }
    }

    fn window_list_property(&self, window: x::Window, property: x::Atom) -> Result<Option<Vec<WindowHandle>>, CaptureError> {
        Ok(self.property(window, property, x::ATOM_WINDOW)?
            .filter(|reply| reply.format() == 32)
            .map(|reply| reply.value::<u32>().iter().map(|id| WindowHandle(*id)).collect()))
    }

    fn check(&self, cookie: xcb::VoidCookieChecked, request: &str) -> Result<xcb::ProtocolResult<()>, CaptureError> {
        let checked = self.conn.check_request(cookie);
        settle_checked(checked, self.conn.has_error(), request)
    }

    fn flush(&self) -> Result<(), CaptureError> {
        self.conn.flush().map_err(|error| CaptureError::Connection(error.to_string()))
    }
}

impl DisplayConnection for X11Connection {
    type Segment = SysvSegment;

    fn client_list(&self, property: ClientListProperty) -> Result<Option<Vec<WindowHandle>>, CaptureError> {
        let atom = match property {
            ClientListProperty::Stacking => self.atoms.client_list_stacking,
            ClientListProperty::Mapping => self.atoms.client_list,
        };
        self.window_list_property(self.root, atom)
    }

    fn frame_relation(&self, window: WindowHandle) -> Result<Option<WindowHandle>, CaptureError> {
        Ok(self.window_list_property(xwindow(window), self.atoms.frame_window)?
            .and_then(|related| related.first().copied())
            .filter(|related| related.0 != 0))
    }

    fn window_title(&self, window: WindowHandle) -> Result<Option<String>, CaptureError> {
        let net_name = self.property(xwindow(window), self.atoms.wm_name, self.atoms.utf8_string)?
            .filter(|reply| reply.format() == 8 && reply.r#type() == self.atoms.utf8_string)
            .map(|reply| decode_text(reply.value::<u8>(), false));
        choose_title(net_name, || {
            match self.property(xwindow(window), x::ATOM_WM_NAME, x::ATOM_ANY)? {
                Some(reply) if reply.format() == 8 => {
                    let latin1 = reply.r#type() == x::ATOM_STRING;
                    Ok(Some(decode_text(reply.value::<u8>(), latin1)))
                },
                _ => Ok(None),
            }
        })
    }

    fn window_attributes(&self, window: WindowHandle) -> Result<Option<WindowAttributes>, CaptureError> {
        let xwin = xwindow(window);
        let attributes_cookie = self.conn.send_request(&x::GetWindowAttributes { window: xwin });
        let geometry_cookie = self.conn.send_request(&x::GetGeometry { drawable: x::Drawable::Window(xwin) });
        let attributes = match self.conn.wait_for_reply(attributes_cookie) {
            Ok(reply) => Some(reply),
            Err(xcb::Error::Protocol(error)) => {
                debug!(window = window.0, ?error, "GetWindowAttributes failed");
                None
            },
            Err(error) => return Err(connection_error(error, "GetWindowAttributes")),
        };
        let geometry = match self.conn.wait_for_reply(geometry_cookie) {
            Ok(reply) => Some(reply),
            Err(xcb::Error::Protocol(error)) => {
                debug!(window = window.0, ?error, "GetGeometry failed");
                None
            },
            Err(error) => return Err(connection_error(error, "GetGeometry")),
        };
        let (Some(attributes), Some(geometry)) = (attributes, geometry) else {
            return Ok(None);
        };
        Ok(Some(WindowAttributes {
            size: Size::new(geometry.width() as u32, geometry.height() as u32),
            depth: geometry.depth(),
            visual: attributes.visual(),
            viewable: attributes.map_state() == x::MapState::Viewable,
        }))
    }

    fn has_compositing(&self) -> Result<bool, CaptureError> {
        if !self.conn.active_extensions().any(|extension| extension == xcb::Extension::Composite) {
            return Ok(false);
        }
        // NameWindowPixmap needs 0.2; the server won't honor requests before a version is negotiated
        let cookie = self.conn.send_request(&composite::QueryVersion {
            client_major_version: 0,
            client_minor_version: 4,
        });
        match self.conn.wait_for_reply(cookie) {
            Ok(reply) => Ok((reply.major_version(), reply.minor_version()) >= (0, 2)),
            Err(xcb::Error::Protocol(error)) => {
                debug!(?error, "composite QueryVersion failed");
                Ok(false)
            },
            Err(error) => Err(connection_error(error, "CompositeQueryVersion")),
        }
    }

    fn redirect_window(&self, window: WindowHandle) -> Result<(), CaptureError> {
        let cookie = self.conn.send_request_checked(&composite::RedirectWindow {
            window: xwindow(window),
            update: composite::Redirect::Automatic,
        });
        // BadAccess only means another client already redirects this window manually
        if let Err(error) = self.check(cookie, "RedirectWindow")? {
            debug!(window = window.0, ?error, "RedirectWindow refused, window is already redirected");
        }
        Ok(())
    }

    fn name_window_pixmap(&self, window: WindowHandle) -> Result<PixmapHandle, CaptureError> {
        let pixmap: x::Pixmap = self.conn.generate_id();
        let cookie = self.conn.send_request_checked(&composite::NameWindowPixmap {
            window: xwindow(window),
            pixmap,
        });
        self.check(cookie, "NameWindowPixmap")?
            .map_err(|error| CaptureError::Acquisition(format!("no pixmap for window {}: {:?}", window, error)))?;
        Ok(PixmapHandle(pixmap.resource_id()))
    }

    fn free_pixmap(&self, pixmap: PixmapHandle) {
        self.conn.send_request(&x::FreePixmap { pixmap: xpixmap(pixmap) });
        if let Err(error) = self.flush() {
            warn!(pixmap = pixmap.0, %error, "FreePixmap not delivered");
        }
    }

    fn pixmap_format(&self, depth: u8) -> Option<PixmapFormat> {
        self.pixmap_formats.iter().find(|format| format.depth == depth).copied()
    }

    fn allocate_segment(&self, len: usize) -> Result<SysvSegment, CaptureError> {
        SysvSegment::create(len)
    }

    fn attach_segment(&self, segment: &SysvSegment) -> Result<SegmentAttachment, CaptureError> {
        if !self.conn.active_extensions().any(|extension| extension == xcb::Extension::Shm) {
            return Err(CaptureError::Acquisition("MIT-SHM extension is not available".into()));
        }
        let shmseg: shm::Seg = self.conn.generate_id();
        let cookie = self.conn.send_request_checked(&shm::Attach {
            shmseg,
            shmid: segment.id() as u32,
            read_only: false,
        });
        self.check(cookie, "ShmAttach")?
            .map_err(|error| CaptureError::Acquisition(format!("shm attach of segment {} refused: {:?}", segment.id(), error)))?;
        Ok(SegmentAttachment(shmseg.resource_id()))
    }

    fn detach_segment(&self, attachment: SegmentAttachment) {
        let cookie = self.conn.send_request_checked(&shm::Detach { shmseg: xseg(attachment) });
        if let Err(error) = self.conn.check_request(cookie) {
            warn!(attachment = attachment.0, ?error, "shm detach failed");
        }
    }

    fn get_image(
        &self,
        pixmap: PixmapHandle,
        layout: &ImageLayout,
        attachment: SegmentAttachment,
        segment: &mut SysvSegment,
    ) -> Result<(), CaptureError> {
        let size = layout.size();
        if segment.len() < layout.byte_len() {
            return Err(CaptureError::Transfer(format!("segment holds {} bytes, frame needs {}", segment.len(), layout.byte_len())));
        }
        let cookie = self.conn.send_request(&shm::GetImage {
            drawable: x::Drawable::Pixmap(xpixmap(pixmap)),
            x: 0,
            y: 0,
            width: size.width as u16,
            height: size.height as u16,
            plane_mask: u32::MAX,
            format: x::ImageFormat::ZPixmap as u8,
            shmseg: xseg(attachment),
            offset: 0,
        });
        match self.conn.wait_for_reply(cookie) {
            Ok(_) => Ok(()),
            Err(xcb::Error::Protocol(error)) => Err(CaptureError::Transfer(format!("shm GetImage: {:?}", error))),
            Err(error) => Err(connection_error(error, "ShmGetImage")),
        }
    }
}
