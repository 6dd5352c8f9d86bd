use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use droidprobe_device::device::{Device, DeviceError};

/// Trigger label of the unconditional first capture.
pub const INITIAL_LABEL: &str = "initial";

/// A screenshot written by the change detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub path: PathBuf,
    /// `initial` or `change_<n>`, where `n` is the number of earlier captures.
    pub label: String,
    pub captured_at: DateTime<Local>,
}

/// Label for a capture triggered by a fingerprint change.
pub fn change_label(previous_captures: usize) -> String {
    format!("change_{previous_captures}")
}

/// `<label>_<HHMMSS>_<millis>.png`. A label reused after a failed capture
/// still gets its own file within the same second.
pub fn file_name(label: &str, at: &DateTime<Local>) -> String {
    format!("{label}_{}.png", at.format("%H%M%S_%3f"))
}

/// Capture the current screen into `dir`.
pub fn capture<D: Device + ?Sized>(
    device: &D,
    dir: &Path,
    label: &str,
) -> Result<ScreenshotRecord, DeviceError> {
    let captured_at = Local::now();
    let path = dir.join(file_name(label, &captured_at));
    device.screenshot(&path)?;
    Ok(ScreenshotRecord {
        path,
        label: label.to_string(),
        captured_at,
    })
}
