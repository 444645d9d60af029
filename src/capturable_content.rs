use std::fmt::Display;

use tracing::debug;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::platform::{ClientListProperty, DisplayConnection, DisplayConnector};
use crate::util::{Size, WindowHandle};

/// A window title, bounded in length.
///
/// Titles longer than the bound are cut at the last character boundary that fits rather than
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WindowTitle(String);

impl WindowTitle {
    pub const DEFAULT_MAX_BYTES: usize = 255;

    pub fn new(text: &str, max_bytes: usize) -> Self {
        let text = match text.find('\0') {
            Some(nul) => &text[..nul],
            None => text,
        };
        let text = text.trim();
        let mut end = text.len().min(max_bytes);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self(text[..end].trim_end().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for WindowTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for WindowTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which windows enumeration should report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturableWindowFilter {
    /// Only report windows that are mapped and viewable
    pub onscreen_only: bool,
}

impl Default for CapturableWindowFilter {
    fn default() -> Self {
        Self { onscreen_only: true }
    }
}

/// A top-level client window found by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturableWindow {
    handle: WindowHandle,
    title: WindowTitle,
    size: Size,
}

impl CapturableWindow {
    /// The client window, with any window manager frame already unwrapped
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn title(&self) -> &WindowTitle {
        &self.title
    }

    /// Size at enumeration time
    pub fn size(&self) -> Size {
        self.size
    }
}

/// Follow a window's frame relation to the window that should be captured.
pub(crate) fn resolve_client_window<C: DisplayConnection>(conn: &C, window: WindowHandle) -> Result<WindowHandle, CaptureError> {
    match conn.frame_relation(window)? {
        Some(client) => {
            debug!(%window, %client, "following frame relation");
            Ok(client)
        },
        None => Ok(window),
    }
}

/// A snapshot of the windows available for capture, in server stacking order.
pub struct CapturableContent {
    windows: Vec<CapturableWindow>,
}

pub struct CapturableWindowIterator<'content> {
    content: &'content CapturableContent,
    i: usize
}

impl<'content> Iterator for CapturableWindowIterator<'content> {
    type Item = &'content CapturableWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.content.windows.get(self.i)?;
        self.i += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.content.windows.len() - self.i;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CapturableWindowIterator<'_> {
}

impl CapturableContent {
    #[cfg(target_os = "linux")]
    /// Enumerate windows on the X display named in `config`
    pub fn new(config: &CaptureConfig, filter: CapturableWindowFilter) -> Result<Self, CaptureError> {
        let connector = crate::platform::platform_impl::X11Connector::new(config);
        Self::with_connector(&connector, config, filter)
    }

    /// Enumerate windows through an arbitrary display connector.
    ///
    /// The connection is opened for this call only and closed before returning.
    pub fn with_connector<K: DisplayConnector>(connector: &K, config: &CaptureConfig, filter: CapturableWindowFilter) -> Result<Self, CaptureError> {
        let conn = connector.connect()?;
        let listed = match conn.client_list(ClientListProperty::Stacking)? {
            Some(listed) => listed,
            None => conn.client_list(ClientListProperty::Mapping)?
                .ok_or_else(|| CaptureError::UnsupportedServer("root window has no _NET_CLIENT_LIST_STACKING or _NET_CLIENT_LIST".into()))?,
        };
        let mut windows = Vec::with_capacity(listed.len());
        for window in listed {
            let client = resolve_client_window(&conn, window)?;
            // Windows that close mid-enumeration simply drop out
            let Some(title) = conn.window_title(client)? else {
                continue;
            };
            let Some(attributes) = conn.window_attributes(client)? else {
                continue;
            };
            if filter.onscreen_only && !attributes.viewable {
                continue;
            }
            windows.push(CapturableWindow {
                handle: client,
                title: WindowTitle::new(&title, config.max_title_bytes),
                size: attributes.size,
            });
        }
        debug!(count = windows.len(), "enumerated capturable windows");
        Ok(Self { windows })
    }

    pub fn windows(&self) -> CapturableWindowIterator<'_> {
        CapturableWindowIterator { content: self, i: 0 }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn into_windows(self) -> Vec<CapturableWindow> {
        self.windows
    }
}

impl IntoIterator for CapturableContent {
    type Item = CapturableWindow;
    type IntoIter = std::vec::IntoIter<CapturableWindow>;

    fn into_iter(self) -> Self::IntoIter {
        self.windows.into_iter()
    }
}

#[cfg(target_os = "linux")]
/// Visible, titled top-level windows on the X display named in `config`, in stacking order.
pub fn list_visible_windows(config: &CaptureConfig) -> Result<Vec<CapturableWindow>, CaptureError> {
    CapturableContent::new(config, CapturableWindowFilter::default()).map(CapturableContent::into_windows)
}
