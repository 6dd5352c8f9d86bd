//! The device automation interface consumed by the exploration engine and the
//! change detector.
//!
//! Implementations serialize access to the underlying device themselves. The
//! engine and the detector share one handle and never coordinate with each
//! other, so a screenshot may land mid-transition of an engine action.

use std::path::Path;

use droidprobe_ui::parse::{parse_hierarchy, ParseError};
use droidprobe_ui::selector::Selector;
use droidprobe_ui::types::{ScreenSize, UiElement};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("element is no longer on screen: {signature}")]
    StaleElement { signature: String },

    #[error("no UI hierarchy available: {reason}")]
    NoHierarchy { reason: String },

    #[error("hierarchy parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("`{command}` failed: {output}")]
    Command { command: String, output: String },

    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("no attached device found")]
    NoDevice,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Whether this failure only affects the element that was acted on.
    pub fn is_stale(&self) -> bool {
        matches!(self, DeviceError::StaleElement { .. })
    }
}

/// UI-level device access.
pub trait Device: Send + Sync {
    /// Raw hierarchy dump of the current screen.
    fn dump_hierarchy(&self) -> Result<String, DeviceError>;

    fn click(&self, element: &UiElement) -> Result<(), DeviceError>;

    fn set_text(&self, element: &UiElement, text: &str) -> Result<(), DeviceError>;

    fn screenshot(&self, path: &Path) -> Result<(), DeviceError>;

    fn screen_size(&self) -> Result<ScreenSize, DeviceError>;

    /// Send the hardware "back" key.
    fn press_back(&self) -> Result<(), DeviceError>;

    /// Elements on the current screen matching `selector`, in document order.
    fn find_elements(&self, selector: &Selector) -> Result<Vec<UiElement>, DeviceError> {
        let xml = self.dump_hierarchy()?;
        let elements = parse_hierarchy(&xml)?;
        Ok(elements.into_iter().filter(|e| selector.matches(e)).collect())
    }

    /// Whether `element` is still present, with the same attributes and bounds.
    /// A failed dump counts as "gone".
    fn exists(&self, element: &UiElement) -> bool {
        self.find_elements(&Selector::new())
            .map(|elements| elements.iter().any(|e| e == element))
            .unwrap_or(false)
    }
}

/// App lifecycle on the device.
pub trait AppManager: Send + Sync {
    fn install(&self, apk: &Path) -> Result<(), DeviceError>;

    /// Remove `package`. An already-absent package is not an error.
    fn uninstall(&self, package: &str) -> Result<(), DeviceError>;

    /// Cold-start the launcher activity of `package`.
    fn launch(&self, package: &str) -> Result<(), DeviceError>;
}

/// Device-wide HTTP proxy setting.
pub trait SystemProxy: Send + Sync {
    fn set_http_proxy(&self, host: &str, port: u16) -> Result<(), DeviceError>;

    fn clear_http_proxy(&self) -> Result<(), DeviceError>;
}
