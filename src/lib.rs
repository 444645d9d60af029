//! Flicker-free capture of X11 windows.
//!
//! Windows are redirected off-screen with the Composite extension and copied into memory shared
//! with the X server (MIT-SHM), so frames can be pulled from windows that are covered or
//! partially off-screen without anything changing on the user's display.
//!
//! [`capturable_content`] lists candidate windows; [`capture_session::CaptureSession`] captures
//! one of them.

pub mod platform;
pub mod feature;

pub mod util;
pub mod error;
pub mod config;
pub mod frame;
pub mod capture_session;
pub mod capturable_content;

pub mod prelude;
