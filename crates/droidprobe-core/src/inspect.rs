//! Static package inspection: package name, launchable activities and a
//! content hash of the APK file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("APK file does not exist: {path}")]
    Missing { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed: {output}")]
    Tool { command: String, output: String },

    #[error("no package name in badging output")]
    NoPackageName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default)]
    pub launchable_activities: Vec<String>,
    pub file_sha256: String,
}

pub trait PackageInspector {
    fn inspect(&self, apk: &Path) -> Result<PackageInfo, InspectError>;
}

/// Reads package metadata with `aapt dump badging`.
pub struct AaptInspector {
    aapt_path: String,
}

impl AaptInspector {
    pub fn new(aapt_path: impl Into<String>) -> Self {
        Self {
            aapt_path: aapt_path.into(),
        }
    }
}

impl PackageInspector for AaptInspector {
    fn inspect(&self, apk: &Path) -> Result<PackageInfo, InspectError> {
        ensure_exists(apk)?;
        info!(apk = %apk.display(), "inspecting package");

        let output = Command::new(&self.aapt_path)
            .args(["dump", "badging"])
            .arg(apk)
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(InspectError::Tool {
                command: format!("{} dump badging {}", self.aapt_path, apk.display()),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut info = parse_badging(&stdout)?;
        info.file_sha256 = sha256_file(apk)?;
        info!(package = %info.package_name, "package inspected");
        Ok(info)
    }
}

/// A package whose name is already known; only the file hash is computed.
pub struct FixedPackage {
    package_name: String,
}

impl FixedPackage {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
        }
    }
}

impl PackageInspector for FixedPackage {
    fn inspect(&self, apk: &Path) -> Result<PackageInfo, InspectError> {
        ensure_exists(apk)?;
        Ok(PackageInfo {
            package_name: self.package_name.clone(),
            version_name: None,
            launchable_activities: Vec::new(),
            file_sha256: sha256_file(apk)?,
        })
    }
}

fn ensure_exists(apk: &Path) -> Result<(), InspectError> {
    if apk.is_file() {
        Ok(())
    } else {
        Err(InspectError::Missing {
            path: apk.to_path_buf(),
        })
    }
}

fn quoted_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)='([^']*)'").expect("badging attribute pattern"))
}

fn attr<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    quoted_attr_re()
        .captures_iter(line)
        .find(|caps| &caps[1] == name)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Parse `aapt dump badging` output. The file hash is left empty.
pub fn parse_badging(output: &str) -> Result<PackageInfo, InspectError> {
    let mut package_name = None;
    let mut version_name = None;
    let mut launchable_activities = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("package:") {
            package_name = attr(rest, "name").map(str::to_string);
            version_name = attr(rest, "versionName")
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("launchable-activity:") {
            if let Some(name) = attr(rest, "name") {
                launchable_activities.push(name.to_string());
            }
        }
    }

    Ok(PackageInfo {
        package_name: package_name
            .filter(|name| !name.is_empty())
            .ok_or(InspectError::NoPackageName)?,
        version_name,
        launchable_activities,
        file_sha256: String::new(),
    })
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String, InspectError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
