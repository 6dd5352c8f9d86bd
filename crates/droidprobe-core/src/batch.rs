//! Batch mode: one session per APK found under a path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// APK files to test. A file is returned as-is; a directory is walked
/// recursively for `*.apk` files, in sorted order.
pub fn collect_apks(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut apks = Vec::new();
    walk(path, &mut apks)?;
    apks.sort();
    Ok(apks)
}

fn walk(dir: &Path, apks: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, apks)?;
        } else if is_apk(&path) {
            apks.push(path);
        }
    }
    Ok(())
}

fn is_apk(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"))
}

/// `<root>/<apk stem>_<YYYYmmdd_HHMMSS>`
pub fn session_dir(root: &Path, apk: &Path, at: &DateTime<Local>) -> PathBuf {
    let stem = apk
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    root.join(format!("{stem}_{}", at.format("%Y%m%d_%H%M%S")))
}
