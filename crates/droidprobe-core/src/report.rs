//! The per-session report written as `final_report.json`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;

use droidprobe_capture::correlator::read_flows;
use droidprobe_capture::flow::FlowRecord;
use droidprobe_explore::trace::ExploreSummary;

use crate::inspect::PackageInfo;
use crate::limits::StopReason;

pub const REPORT_FILE: &str = "final_report.json";

/// Note stored instead of flows when the flow log cannot be read.
pub const UNREADABLE_FLOWS_NOTE: &str = "flow capture empty or unreadable";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticAnalysis {
    Package(PackageInfo),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkFlows {
    Records(Vec<FlowRecord>),
    Note(String),
}

impl NetworkFlows {
    /// Load a flow log, degrading to a note if it cannot be read.
    pub fn load(path: &Path) -> Self {
        match read_flows(path) {
            Ok(records) => NetworkFlows::Records(records),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read flow log");
                NetworkFlows::Note(UNREADABLE_FLOWS_NOTE.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub apk: PathBuf,
    pub test_start_time: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_end_time: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_analysis: Option<StaticAnalysis>,
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_flows: Option<NetworkFlows>,
    #[serde(default)]
    pub exploration: ExploreSummary,
    pub stop_reason: StopReason,
    /// The fatal error that ended the session early, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionReport {
    pub fn begin(apk: &Path) -> Self {
        Self {
            apk: apk.to_path_buf(),
            test_start_time: Local::now(),
            test_end_time: None,
            static_analysis: None,
            screenshots: Vec::new(),
            network_flows: None,
            exploration: ExploreSummary::default(),
            stop_reason: StopReason::Complete,
            error: None,
        }
    }

    pub fn package_name(&self) -> Option<&str> {
        match &self.static_analysis {
            Some(StaticAnalysis::Package(info)) => Some(&info.package_name),
            _ => None,
        }
    }

    pub fn finish(&mut self) {
        self.test_end_time = Some(Local::now());
    }

    /// Write as 4-space indented JSON to `<dir>/final_report.json`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        let path = dir.join(REPORT_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.serialize(&mut ser)?;
        writer.flush()?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self, std::io::Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
