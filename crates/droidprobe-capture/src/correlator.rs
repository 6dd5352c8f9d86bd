//! Request/response correlation with whole-file persistence.
//!
//! Records are kept in observation order. A response resolves the first
//! still-pending record with the same URL; two in-flight requests to one URL
//! can therefore swap responses. Every mutation rewrites the complete flow
//! log, so the file on disk is always a full, valid snapshot.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::CorrelatorConfig;
use crate::flow::{FlowRecord, FlowResponse, ObservedResponse, RequestInfo};
use crate::CaptureError;

pub struct FlowCorrelator {
    path: PathBuf,
    excluded_host: String,
    records: Mutex<Vec<FlowRecord>>,
}

impl FlowCorrelator {
    /// Correlator persisting to `path`. Nothing is written until the first
    /// request is recorded.
    pub fn new(path: impl Into<PathBuf>, excluded_host: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            excluded_host: excluded_host.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Correlator writing `<output_dir>/<capture_dir>/<flows_file>`.
    pub fn in_dir(output_dir: &Path, config: &CorrelatorConfig) -> Result<Self, CaptureError> {
        let dir = output_dir.join(&config.capture_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(Self::new(
            dir.join(&config.flows_file),
            config.excluded_host_substring.clone(),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FlowRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_excluded(&self, host: &str) -> bool {
        !self.excluded_host.is_empty() && host.contains(&self.excluded_host)
    }

    /// Append a pending record. Returns false if the host is excluded.
    pub fn on_request_observed(&self, request: RequestInfo) -> bool {
        if self.is_excluded(&request.host) {
            debug!(host = %request.host, "excluded host, request dropped");
            return false;
        }

        let mut records = self.lock();
        debug!(method = %request.method, url = %request.url, "request recorded");
        records.push(FlowRecord::pending(request));
        self.persist(&records);
        true
    }

    /// Resolve the first pending record for `request.url`. `None` marks the
    /// flow as having ended without a response. Returns whether a record
    /// was resolved.
    pub fn on_response_observed(
        &self,
        request: &RequestInfo,
        response: Option<ObservedResponse>,
    ) -> bool {
        if self.is_excluded(&request.host) {
            debug!(host = %request.host, "excluded host, response dropped");
            return false;
        }

        let mut records = self.lock();
        let Some(record) = records
            .iter_mut()
            .find(|r| r.is_pending() && r.request.url == request.url)
        else {
            debug!(url = %request.url, "response without a pending request");
            return false;
        };

        let resolved = match response {
            Some(observed) => FlowResponse::from_observed(observed),
            None => FlowResponse::missing(),
        };
        debug!(url = %request.url, "response matched");
        record.response = Some(resolved);
        self.persist(&records);
        true
    }

    /// Snapshot of all records in observation order.
    pub fn records(&self) -> Vec<FlowRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|r| r.is_pending()).count()
    }

    /// Rewrite the flow log. Failures are logged; capture goes on.
    fn persist(&self, records: &[FlowRecord]) {
        if let Err(e) = write_flows(&self.path, records) {
            warn!(path = %self.path.display(), error = %e, "failed to persist flow log");
        }
    }

    pub fn log_summary(&self) {
        let records = self.lock();
        let pending = records.iter().filter(|r| r.is_pending()).count();
        info!(flows = records.len(), pending, "flow capture summary");
    }
}

/// Write `records` as a pretty-printed JSON array, replacing `path`
/// atomically.
pub fn write_flows(path: &Path, records: &[FlowRecord]) -> Result<(), CaptureError> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a flow log written by [`write_flows`].
pub fn read_flows(path: &Path) -> Result<Vec<FlowRecord>, CaptureError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
