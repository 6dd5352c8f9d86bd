//! UI change detector.
//!
//! Polls the device on its own thread, independently of the exploration
//! engine, and captures a screenshot whenever the UI fingerprint changes.
//! The detector shares the device handle with the engine without any
//! coordination, so a capture may show a screen mid-transition.
//!
//! Lifecycle: stopped -> running -> stopped. [`ChangeDetector::stop`]
//! joins the polling thread; no capture starts after it returns.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use droidprobe_device::device::Device;
use droidprobe_ui::fingerprint::{fingerprint, UiFingerprint};

use crate::screenshot::{self, ScreenshotRecord, INITIAL_LABEL};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("change detector is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Seconds between polls.
    pub interval_secs: f64,
    /// Directory name, under the session output directory, for screenshots.
    pub screenshot_dir: String,
}

impl DetectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            screenshot_dir: "screenshots".to_string(),
        }
    }
}

type Records = Arc<Mutex<Vec<ScreenshotRecord>>>;

fn lock(records: &Records) -> MutexGuard<'_, Vec<ScreenshotRecord>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Running {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ChangeDetector<D: Device + 'static> {
    device: Arc<D>,
    interval: Duration,
    dir: PathBuf,
    records: Records,
    running: Option<Running>,
}

impl<D: Device + 'static> ChangeDetector<D> {
    /// Detector writing into `<output_dir>/<config.screenshot_dir>`.
    pub fn new(device: Arc<D>, output_dir: &Path, config: &DetectorConfig) -> Self {
        Self {
            device,
            interval: config.interval(),
            dir: output_dir.join(&config.screenshot_dir),
            records: Arc::new(Mutex::new(Vec::new())),
            running: None,
        }
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Snapshot of the captures so far, in order.
    pub fn records(&self) -> Vec<ScreenshotRecord> {
        lock(&self.records).clone()
    }

    /// Capture the initial screenshot and start polling.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        std::fs::create_dir_all(&self.dir)?;

        // The screen the initial capture shows is the baseline; only a
        // departure from it counts as a change.
        let baseline = current_fingerprint(self.device.as_ref());
        capture_into(self.device.as_ref(), &self.dir, INITIAL_LABEL, &self.records);

        let (stop_tx, stop_rx) = channel::bounded(1);
        let poller = Poller {
            device: Arc::clone(&self.device),
            interval: self.interval,
            dir: self.dir.clone(),
            records: Arc::clone(&self.records),
            stop: stop_rx,
            last: baseline,
        };
        let handle = std::thread::Builder::new()
            .name("ui-change-detector".to_string())
            .spawn(move || poller.run())?;

        info!(
            interval_secs = self.interval.as_secs_f64(),
            dir = %self.dir.display(),
            "change detector started"
        );
        self.running = Some(Running {
            stop: stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop polling and wait for the thread to finish. Returns every capture
    /// in order. Calling it on a stopped detector just returns the records.
    pub fn stop(&mut self) -> Vec<ScreenshotRecord> {
        if let Some(running) = self.running.take() {
            // A full channel means a stop is already pending.
            let _ = running.stop.try_send(());
            if running.handle.join().is_err() {
                warn!("change detector thread panicked");
            }
            info!(captures = lock(&self.records).len(), "change detector stopped");
        }
        self.records()
    }
}

impl<D: Device + 'static> Drop for ChangeDetector<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Poller<D> {
    device: Arc<D>,
    interval: Duration,
    dir: PathBuf,
    records: Records,
    stop: Receiver<()>,
    last: Option<UiFingerprint>,
}

impl<D: Device> Poller<D> {
    fn run(mut self) {
        loop {
            match self.stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let Some(current) = current_fingerprint(self.device.as_ref()) else {
                continue;
            };
            if self.last == Some(current) {
                continue;
            }

            if self.stop_requested() {
                break;
            }
            debug!(fingerprint = %current.short(), "UI changed");
            let label = screenshot::change_label(lock(&self.records).len());
            capture_into(self.device.as_ref(), &self.dir, &label, &self.records);
            self.last = Some(current);
            if self.stop_requested() {
                break;
            }
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }
}

/// Fingerprint of the current screen; `None` when no dump is available.
fn current_fingerprint<D: Device + ?Sized>(device: &D) -> Option<UiFingerprint> {
    match device.dump_hierarchy() {
        Ok(xml) => Some(fingerprint(&xml)),
        Err(e) => {
            debug!(error = %e, "no hierarchy this tick");
            None
        }
    }
}

fn capture_into<D: Device + ?Sized>(device: &D, dir: &Path, label: &str, records: &Records) {
    match screenshot::capture(device, dir, label) {
        Ok(record) => {
            info!(label, path = %record.path.display(), "screenshot captured");
            lock(records).push(record);
        }
        Err(e) => warn!(label, error = %e, "screenshot failed"),
    }
}
