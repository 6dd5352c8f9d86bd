//! Device transport configuration: adb binary, target serial and timeouts.
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the adb-backed device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Target serial. None = first device reported by `adb devices`.
    pub serial: Option<String>,
    /// adb executable (looked up on PATH when relative).
    pub adb_path: PathBuf,
    /// Timeout for ordinary shell commands.
    pub command_timeout_secs: u64,
    /// Timeout for `adb install`, which can be slow for large packages.
    pub install_timeout_secs: u64,
    /// Pass `-g` to `adb install`, granting every runtime permission so no
    /// permission popups appear.
    pub grant_permissions: bool,
    /// Wait after launching the app before exploration starts.
    pub launch_settle_secs: f64,
    /// On-device scratch file for hierarchy dumps.
    pub remote_dump_path: String,
    /// On-device scratch file for screenshots.
    pub remote_screenshot_path: String,
}

impl DeviceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_secs_f64(self.launch_settle_secs)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            adb_path: PathBuf::from("adb"),
            command_timeout_secs: 30,
            install_timeout_secs: 180,
            grant_permissions: false,
            launch_settle_secs: 5.0,
            remote_dump_path: "/sdcard/window_dump.xml".to_string(),
            remote_screenshot_path: "/sdcard/screenshot.png".to_string(),
        }
    }
}
