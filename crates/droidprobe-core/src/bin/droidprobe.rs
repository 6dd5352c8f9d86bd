use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tracing::{error, info};

use droidprobe_capture::correlator::FlowCorrelator;
use droidprobe_capture::mitm::MitmdumpProxy;
use droidprobe_capture::CaptureError;
use droidprobe_core::batch::{collect_apks, session_dir};
use droidprobe_core::config::{ConfigError, ProbeConfig};
use droidprobe_core::inspect::{AaptInspector, FixedPackage, PackageInspector};
use droidprobe_core::limits::StopReason;
use droidprobe_core::session::{Session, SessionError, SessionOutcome};
use droidprobe_core::telemetry;
use droidprobe_device::adb::AdbDevice;
use droidprobe_device::device::DeviceError;

/// Install, explore and observe Android apps on an attached device.
#[derive(Parser)]
#[command(name = "droidprobe", version)]
struct Cli {
    /// APK file, or a directory searched recursively for APKs
    #[arg(default_value = "apks")]
    target: PathBuf,

    /// Device serial (defaults to the first attached device)
    #[arg(long)]
    device: Option<String>,

    /// Exploration window per app, in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Directory receiving one session directory per app
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Package name to use instead of inspecting the APK with aapt
    #[arg(long)]
    package: Option<String>,

    /// Skip traffic capture
    #[arg(long)]
    no_capture: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("capture setup failed: {0}")]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("cannot list APKs under {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no APK files found under {0}")]
    NoApks(PathBuf),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init_tracing(cli.json_logs) {
        eprintln!("warning: could not initialise logging: {e}");
    }

    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "some sessions did not complete");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "droidprobe failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of sessions that did not complete.
fn run(cli: &Cli) -> Result<usize, CliError> {
    let mut config = match &cli.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(serial) = &cli.device {
        config.device.serial = Some(serial.clone());
    }
    if let Some(duration) = cli.duration {
        config.limits.test_duration_secs = duration;
    }
    config.validate()?;

    let apks = collect_apks(&cli.target).map_err(|source| CliError::Scan {
        path: cli.target.clone(),
        source,
    })?;
    if apks.is_empty() {
        return Err(CliError::NoApks(cli.target.clone()));
    }
    info!(count = apks.len(), "APKs queued");

    let device = Arc::new(AdbDevice::connect(config.device.clone())?);
    let mut failed = 0;
    for apk in &apks {
        let output_dir = session_dir(&cli.output, apk, &Local::now());
        match run_session(cli, &config, &device, apk, output_dir) {
            Ok(outcome) => {
                println!("{}", outcome.report_path.display());
                if outcome.report.stop_reason != StopReason::Complete {
                    failed += 1;
                }
            }
            Err(e) => {
                error!(apk = %apk.display(), error = %e, "session failed");
                failed += 1;
            }
        }
    }
    Ok(failed)
}

fn run_session(
    cli: &Cli,
    config: &ProbeConfig,
    device: &Arc<AdbDevice>,
    apk: &Path,
    output_dir: PathBuf,
) -> Result<SessionOutcome, CliError> {
    let inspector: Box<dyn PackageInspector> = match &cli.package {
        Some(name) => Box::new(FixedPackage::new(name.as_str())),
        None => Box::new(AaptInspector::new(config.inspector.aapt_path.as_str())),
    };
    let mut session = Session::new(Arc::clone(device), config.clone(), output_dir, inspector)?;

    if !cli.no_capture && config.proxy.enabled {
        let correlator = Arc::new(FlowCorrelator::in_dir(
            session.output_dir(),
            &config.correlator,
        )?);
        let proxy = MitmdumpProxy::new(config.proxy.clone(), Arc::clone(device), correlator)?;
        session = session.with_interceptor(Box::new(proxy));
    }

    Ok(session.run(apk)?)
}
