#[cfg(feature = "bitmap")]
pub mod bitmap;
