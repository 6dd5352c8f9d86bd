//! mitmdump as the interception collaborator.
//!
//! An addon script makes mitmdump print one intercept event per line on
//! stdout; a pump task feeds those lines into the correlator. The device's
//! global HTTP proxy is pointed at mitmdump for the duration of the capture.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use droidprobe_device::device::SystemProxy;

use crate::config::ProxyConfig;
use crate::correlator::FlowCorrelator;
use crate::feed::pump_lines;
use crate::interceptor::Interceptor;
use crate::CaptureError;

const ADDON_SCRIPT: &str = include_str!("addon.py");
const ADDON_FILE: &str = "mitm_addon.py";

pub struct MitmdumpProxy<S: SystemProxy> {
    config: ProxyConfig,
    device: Arc<S>,
    correlator: Arc<FlowCorrelator>,
    script_dir: PathBuf,
    runtime: Runtime,
    child: Option<Child>,
    pump: Option<JoinHandle<Result<usize, CaptureError>>>,
}

impl<S: SystemProxy> MitmdumpProxy<S> {
    /// The addon script is written next to the flow log.
    pub fn new(
        config: ProxyConfig,
        device: Arc<S>,
        correlator: Arc<FlowCorrelator>,
    ) -> Result<Self, CaptureError> {
        let script_dir = correlator
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mitmdump-feed")
            .enable_all()
            .build()?;
        Ok(Self {
            config,
            device,
            correlator,
            script_dir,
            runtime,
            child: None,
            pump: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn correlator(&self) -> &Arc<FlowCorrelator> {
        &self.correlator
    }

    fn write_addon(&self) -> Result<PathBuf, CaptureError> {
        let path = self.script_dir.join(ADDON_FILE);
        std::fs::write(&path, ADDON_SCRIPT)?;
        Ok(path)
    }

    fn spawn(&mut self) -> Result<bool, CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        let script = self.write_addon()?;
        let confdir = format!("confdir={}", self.config.resolved_confdir().display());

        info!(port = self.config.port, "starting mitmdump");
        let mut child = {
            // Spawning registers the child with the runtime's reactor.
            let _enter = self.runtime.enter();
            Command::new(&self.config.mitmdump_path)
                .arg("-p")
                .arg(self.config.port.to_string())
                .arg("-s")
                .arg(&script)
                .arg("--set")
                .arg(&confdir)
                .arg("--ssl-insecure")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| CaptureError::Spawn {
                    binary: self.config.mitmdump_path.clone(),
                    source,
                })?
        };

        if let Some(stdout) = child.stdout.take() {
            let correlator = Arc::clone(&self.correlator);
            self.pump = Some(
                self.runtime
                    .spawn(async move { pump_lines(BufReader::new(stdout), &correlator).await }),
            );
        }

        let grace = self.config.startup_grace();
        self.runtime.block_on(tokio::time::sleep(grace));
        if let Some(status) = child.try_wait()? {
            warn!(%status, "mitmdump exited during startup");
            return Ok(false);
        }
        info!(
            port = self.config.port,
            flows = %self.correlator.path().display(),
            "mitmdump started"
        );
        self.child = Some(child);

        match self
            .device
            .set_http_proxy(&self.config.device_host, self.config.port)
        {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "could not configure device proxy");
                Ok(false)
            }
        }
    }
}

impl<S: SystemProxy> Interceptor for MitmdumpProxy<S> {
    fn start(&mut self) -> bool {
        match self.spawn() {
            Ok(started) => started,
            Err(e) => {
                warn!(error = %e, "traffic capture unavailable");
                false
            }
        }
    }

    fn stop(&mut self) -> Option<PathBuf> {
        if let Err(e) = self.device.clear_http_proxy() {
            warn!(error = %e, "could not clear device proxy");
        }

        let timeout = self.config.stop_timeout();
        if let Some(mut child) = self.child.take() {
            info!("stopping mitmdump");
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "mitmdump already gone");
            }
            let waited = self
                .runtime
                .block_on(async { tokio::time::timeout(timeout, child.wait()).await });
            match waited {
                Ok(Ok(status)) => debug!(%status, "mitmdump exited"),
                Ok(Err(e)) => warn!(error = %e, "waiting for mitmdump failed"),
                Err(_) => warn!("mitmdump did not exit in time"),
            }
        }

        if let Some(pump) = self.pump.take() {
            let drained = self
                .runtime
                .block_on(async { tokio::time::timeout(timeout, pump).await });
            match drained {
                Ok(Ok(Ok(events))) => debug!(events, "intercept feed drained"),
                Ok(Ok(Err(e))) => warn!(error = %e, "intercept feed failed"),
                Ok(Err(e)) => warn!(error = %e, "intercept feed task failed"),
                Err(_) => warn!("intercept feed did not close in time"),
            }
        }

        self.correlator.log_summary();
        let path = self.correlator.path();
        path.exists().then(|| path.to_path_buf())
    }
}
