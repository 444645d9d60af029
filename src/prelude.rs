pub use crate::capturable_content::*;
pub use crate::capture_session::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::frame::*;
pub use crate::util::*;

#[cfg(feature = "bitmap")]
pub use crate::feature::bitmap::*;
