//! Session orchestration.
//!
//! One session tests one APK:
//!
//! 1. inspect the package
//! 2. start traffic capture (a failure here is only a warning)
//! 3. remove any stale install, then install
//! 4. launch the app and start the change detector
//! 5. step the exploration engine until the test window closes
//!
//! Whatever happens, the detector and the interceptor are stopped, the app
//! is uninstalled and `final_report.json` is written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use droidprobe_capture::interceptor::Interceptor;
use droidprobe_device::device::{AppManager, Device, DeviceError};
use droidprobe_explore::engine::ExplorationEngine;
use droidprobe_explore::policy::PolicyError;
use droidprobe_monitor::detector::ChangeDetector;

use crate::config::{ConfigError, ProbeConfig};
use crate::inspect::{InspectError, PackageInspector};
use crate::limits::{SessionTimer, StopReason};
use crate::report::{NetworkFlows, SessionReport, StaticAnalysis};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("package inspection failed: {0}")]
    Inspection(#[from] InspectError),

    #[error("install failed: {0}")]
    Install(#[source] DeviceError),

    #[error("launch failed: {0}")]
    Launch(#[source] DeviceError),

    #[error("invalid exploration policy: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn stop_reason(&self) -> StopReason {
        match self {
            SessionError::Inspection(_) => StopReason::InspectionFailed,
            SessionError::Install(_) => StopReason::InstallFailed,
            SessionError::Launch(_) => StopReason::LaunchFailed,
            SessionError::Policy(_) | SessionError::Config(_) | SessionError::Io(_) => {
                StopReason::Aborted
            }
        }
    }
}

/// A finished session: the report and where it was written.
#[derive(Debug)]
pub struct SessionOutcome {
    pub report: SessionReport,
    pub report_path: PathBuf,
}

pub struct Session<D: Device + AppManager + 'static> {
    device: Arc<D>,
    config: ProbeConfig,
    output_dir: PathBuf,
    inspector: Box<dyn PackageInspector>,
    interceptor: Option<Box<dyn Interceptor>>,
}

impl<D: Device + AppManager + 'static> Session<D> {
    /// Session writing its artifacts into `output_dir`, which is created.
    pub fn new(
        device: Arc<D>,
        config: ProbeConfig,
        output_dir: PathBuf,
        inspector: Box<dyn PackageInspector>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            device,
            config,
            output_dir,
            inspector,
            interceptor: None,
        })
    }

    pub fn with_interceptor(mut self, interceptor: Box<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run the whole session against `apk`. Fatal setup failures end up in
    /// the report's `stop_reason`; only a failure to write the report is
    /// returned as an error.
    pub fn run(&mut self, apk: &Path) -> Result<SessionOutcome, SessionError> {
        info!(apk = %apk.display(), output = %self.output_dir.display(), "session started");
        let mut report = SessionReport::begin(apk);
        let mut detector = None;

        if let Err(e) = self.drive(apk, &mut report, &mut detector) {
            warn!(error = %e, "session ended early");
            report.stop_reason = e.stop_reason();
            report.error = Some(e.to_string());
        }

        self.cleanup(&mut report, detector);
        let report_path = report.write(&self.output_dir)?;
        info!(
            report = %report_path.display(),
            stop_reason = ?report.stop_reason,
            screenshots = report.screenshots.len(),
            "session finished"
        );
        Ok(SessionOutcome {
            report,
            report_path,
        })
    }

    fn drive(
        &mut self,
        apk: &Path,
        report: &mut SessionReport,
        detector: &mut Option<ChangeDetector<D>>,
    ) -> Result<(), SessionError> {
        let mut engine =
            ExplorationEngine::from_config(Arc::clone(&self.device), self.config.explore.clone())?;

        let package = match self.inspector.inspect(apk) {
            Ok(info) => {
                report.static_analysis = Some(StaticAnalysis::Package(info.clone()));
                info
            }
            Err(e) => {
                report.static_analysis = Some(StaticAnalysis::Failed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if let Some(interceptor) = self.interceptor.as_mut() {
            if !interceptor.start() {
                warn!("traffic capture did not start, continuing without it");
            }
        }

        if let Err(e) = self.device.uninstall(&package.package_name) {
            debug!(error = %e, "no previous install removed");
        }
        self.device.install(apk).map_err(SessionError::Install)?;
        self.device
            .launch(&package.package_name)
            .map_err(SessionError::Launch)?;

        let monitor = detector.insert(ChangeDetector::new(
            Arc::clone(&self.device),
            &self.output_dir,
            &self.config.detector,
        ));
        if let Err(e) = monitor.start() {
            warn!(error = %e, "change detector did not start");
        }

        let limits = &self.config.limits;
        info!(duration_secs = limits.test_duration_secs, "exploring");
        let timer = SessionTimer::start(limits);
        while !timer.expired() {
            engine.step();
            std::thread::sleep(limits.step_interval().min(timer.remaining()));
        }
        info!(elapsed_secs = timer.elapsed_secs(), "exploration window closed");

        report.exploration = engine.summary();
        Ok(())
    }

    fn cleanup(&mut self, report: &mut SessionReport, detector: Option<ChangeDetector<D>>) {
        if let Some(mut detector) = detector {
            report.screenshots = detector.stop().into_iter().map(|r| r.path).collect();
        }

        if let Some(interceptor) = self.interceptor.as_mut() {
            if let Some(path) = interceptor.stop() {
                report.network_flows = Some(NetworkFlows::load(&path));
            }
        }

        if let Some(package) = report.package_name().map(str::to_string) {
            if let Err(e) = self.device.uninstall(&package) {
                warn!(package = %package, error = %e, "uninstall failed");
            }
        }
        report.finish();
    }
}
