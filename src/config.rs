use crate::capturable_content::WindowTitle;

/// Settings shared by window enumeration and capture sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub(crate) display_name: Option<String>,
    pub(crate) max_title_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            max_title_bytes: WindowTitle::DEFAULT_MAX_BYTES,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to `display` (for example `":1"`) instead of `$DISPLAY`
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_name = Some(display.into());
        self
    }

    /// Bound window titles to `max_bytes` bytes of UTF-8
    pub fn with_max_title_bytes(mut self, max_bytes: usize) -> Self {
        self.max_title_bytes = max_bytes;
        self
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn max_title_bytes(&self) -> usize {
        self.max_title_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_environment_display() {
        let config = CaptureConfig::default();
        assert_eq!(config.display_name(), None);
        assert_eq!(config.max_title_bytes(), 255);
    }

    #[test]
    fn builder_overrides() {
        let config = CaptureConfig::new().with_display(":3").with_max_title_bytes(16);
        assert_eq!(config.display_name(), Some(":3"));
        assert_eq!(config.max_title_bytes(), 16);
    }
}
