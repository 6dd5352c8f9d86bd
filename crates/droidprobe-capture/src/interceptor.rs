use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::correlator::FlowCorrelator;
use crate::feed::pump_lines;

/// A source of intercepted traffic feeding a [`FlowCorrelator`] for the
/// duration of a session.
pub trait Interceptor {
    /// Begin capturing. Returns false if capture could not be set up; the
    /// session goes on without traffic.
    fn start(&mut self) -> bool;

    /// Stop capturing and return the flow log path, if one was written.
    fn stop(&mut self) -> Option<PathBuf>;
}

/// Replays a recorded intercept event log into the correlator on start.
pub struct ReplayFeed {
    correlator: Arc<FlowCorrelator>,
    events: String,
}

impl ReplayFeed {
    pub fn new(correlator: Arc<FlowCorrelator>, events: impl Into<String>) -> Self {
        Self {
            correlator,
            events: events.into(),
        }
    }

    pub fn from_file(correlator: Arc<FlowCorrelator>, path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(correlator, std::fs::read_to_string(path)?))
    }

    pub fn correlator(&self) -> &Arc<FlowCorrelator> {
        &self.correlator
    }
}

impl Interceptor for ReplayFeed {
    fn start(&mut self) -> bool {
        let runtime = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "could not build replay runtime");
                return false;
            }
        };
        match runtime.block_on(pump_lines(self.events.as_bytes(), &self.correlator)) {
            Ok(events) => {
                info!(events, "replayed intercept events");
                true
            }
            Err(e) => {
                warn!(error = %e, "replay failed");
                false
            }
        }
    }

    fn stop(&mut self) -> Option<PathBuf> {
        let path = self.correlator.path();
        path.exists().then(|| path.to_path_buf())
    }
}
