//! Top-level configuration, loaded from a JSON file. Every section and
//! field is optional and falls back to its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use droidprobe_capture::config::{CorrelatorConfig, ProxyConfig};
use droidprobe_device::config::DeviceConfig;
use droidprobe_explore::engine::ExploreConfig;
use droidprobe_monitor::detector::DetectorConfig;

use crate::limits::SessionLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value} for {field}")]
    Invalid { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub aapt_path: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            aapt_path: "aapt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub device: DeviceConfig,
    pub explore: ExploreConfig,
    pub detector: DetectorConfig,
    pub correlator: CorrelatorConfig,
    pub proxy: ProxyConfig,
    pub limits: SessionLimits,
    pub inspector: InspectorConfig,
}

impl ProbeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot use: every `*_secs` field must be a
    /// finite, non-negative duration and the band start a screen fraction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("device.launch_settle_secs", self.device.launch_settle_secs),
            ("explore.idle_for_back_press_secs", self.explore.idle_for_back_press_secs),
            ("explore.focus_settle_secs", self.explore.focus_settle_secs),
            ("explore.confirm_settle_secs", self.explore.confirm_settle_secs),
            ("detector.interval_secs", self.detector.interval_secs),
            ("proxy.startup_grace_secs", self.proxy.startup_grace_secs),
            ("proxy.stop_timeout_secs", self.proxy.stop_timeout_secs),
            ("limits.test_duration_secs", self.limits.test_duration_secs),
            ("limits.step_interval_secs", self.limits.step_interval_secs),
        ];
        for (field, value) in durations {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::Invalid { field, value });
            }
        }

        let band = self.explore.bottom_band_start;
        if !(0.0..=1.0).contains(&band) {
            return Err(ConfigError::Invalid {
                field: "explore.bottom_band_start",
                value: band,
            });
        }
        Ok(())
    }
}
