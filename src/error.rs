use thiserror::Error;

use crate::util::WindowHandle;

/// Failure of a capture or enumeration operation.
///
/// Errors are never retried internally. A `Connection` or `WindowQuery` error ends the
/// usefulness of a session; the caller must open a new one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Display server connection failed: {0}")]
    Connection(String),

    #[error("Display server lacks required support: {0}")]
    UnsupportedServer(String),

    #[error("Window {window} could not be queried: {reason}")]
    WindowQuery { window: WindowHandle, reason: String },

    #[error("Display server refused acquisition: {0}")]
    Acquisition(String),

    #[error("Local resource allocation failed: {0}")]
    Resource(String),

    #[error("Frame transfer rejected: {0}")]
    Transfer(String),

    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),
}
