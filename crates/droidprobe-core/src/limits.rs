//! Session duration limits and stop reasons.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Wall-clock length of the exploration window.
    pub test_duration_secs: f64,
    /// Pause between engine steps.
    pub step_interval_secs: f64,
}

impl SessionLimits {
    pub fn test_duration(&self) -> Duration {
        Duration::from_secs_f64(self.test_duration_secs)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_secs_f64(self.step_interval_secs)
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            test_duration_secs: 60.0,
            step_interval_secs: 1.0,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The exploration window ran out.
    Complete,
    /// The package could not be inspected.
    InspectionFailed,
    InstallFailed,
    LaunchFailed,
    /// Setup failed for a reason unrelated to the package.
    Aborted,
}

/// Wall-clock window for the exploration loop.
pub struct SessionTimer {
    duration: Duration,
    start: Instant,
}

impl SessionTimer {
    pub fn start(limits: &SessionLimits) -> Self {
        Self {
            duration: limits.test_duration(),
            start: Instant::now(),
        }
    }

    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.start.elapsed())
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
