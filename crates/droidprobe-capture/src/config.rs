use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flow log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Traffic to hosts containing this substring is never recorded.
    /// Empty disables the rule.
    pub excluded_host_substring: String,
    /// Directory name, under the session output directory, for capture files.
    pub capture_dir: String,
    pub flows_file: String,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            excluded_host_substring: "ldmnq.com".to_string(),
            capture_dir: "capture".to_string(),
            flows_file: "flows.json".to_string(),
        }
    }
}

/// mitmdump process and device proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub port: u16,
    /// Host address the device uses to reach the proxy.
    pub device_host: String,
    pub mitmdump_path: String,
    /// mitmproxy configuration directory; `~/.mitmproxy` when unset.
    pub confdir: Option<PathBuf>,
    /// Time the process gets to come up before it is considered started.
    pub startup_grace_secs: f64,
    /// Time the process gets to exit on stop before the pump is abandoned.
    pub stop_timeout_secs: f64,
}

impl ProxyConfig {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs_f64(self.startup_grace_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stop_timeout_secs)
    }

    pub fn resolved_confdir(&self) -> PathBuf {
        match &self.confdir {
            Some(dir) => dir.clone(),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".mitmproxy"),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            device_host: "192.168.0.162".to_string(),
            mitmdump_path: "mitmdump".to_string(),
            confdir: None,
            startup_grace_secs: 3.0,
            stop_timeout_secs: 5.0,
        }
    }
}
