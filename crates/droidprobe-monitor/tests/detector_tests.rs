use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, TimeZone};
use droidprobe_device::scripted::ScriptedDevice;
use droidprobe_monitor::detector::{ChangeDetector, DetectorConfig, MonitorError};
use droidprobe_monitor::screenshot::file_name;
use droidprobe_ui::types::ScreenSize;

fn screen(title: &str, clock: &str) -> String {
    format!(
        r#"<hierarchy rotation="0"><node text="{clock}" class="android.widget.TextView" package="com.android.systemui" content-desc="" clickable="false" bounds="[0,0][100,40]" /><node text="{title}" class="android.widget.TextView" package="com.example.app" content-desc="" clickable="false" bounds="[0,100][1080,200]" /></hierarchy>"#
    )
}

fn fast_config() -> DetectorConfig {
    DetectorConfig {
        interval_secs: 0.01,
        ..DetectorConfig::default()
    }
}

fn device() -> Arc<ScriptedDevice> {
    Arc::new(ScriptedDevice::new(ScreenSize::new(1080, 1920)))
}

/// Poll `cond` until it holds or a generous deadline passes.
fn wait_for(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_initial_capture_happens_on_start() {
    let device = device();
    device.set_screen(screen("Home", "10:00"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device.clone(), out.path(), &fast_config());

    detector.start().unwrap();
    // The capture is synchronous with start().
    assert_eq!(device.screenshots(), 1);
    let records = detector.stop();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "initial");
    assert!(records[0].path.starts_with(out.path().join("screenshots")));
    assert!(records[0].path.exists());
    let name = records[0].path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("initial_") && name.ends_with(".png"));
    assert_eq!(name.len(), "initial_HHMMSS_mmm.png".len());
}

#[test]
fn test_file_names_differ_within_one_second() {
    let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap();
    let later = at + chrono::Duration::milliseconds(250);

    assert_eq!(file_name("change_1", &at), "change_1_090307_000.png");
    assert_eq!(file_name("change_1", &later), "change_1_090307_250.png");
}

#[test]
fn test_single_change_yields_two_screenshots() {
    let device = device();
    device.push_screen(screen("Home", "10:00"));
    device.push_screen(screen("Home", "10:00"));
    device.push_screen(screen("Home", "10:01"));
    device.push_screen(screen("Settings", "10:01"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device.clone(), out.path(), &fast_config());

    detector.start().unwrap();
    wait_for(|| device.dump_count() >= 8);
    let records = detector.stop();

    let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["initial", "change_1"]);
    assert_eq!(device.screenshots(), 2);
}

#[test]
fn test_missing_dump_is_no_change() {
    let device = device();
    device.push_screen(screen("Home", "10:00"));
    device.push_missing_dump();
    device.push_missing_dump();
    device.push_screen(screen("Home", "10:00"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device.clone(), out.path(), &fast_config());

    detector.start().unwrap();
    wait_for(|| device.dump_count() >= 6);
    let records = detector.stop();

    assert_eq!(records.len(), 1);
}

#[test]
fn test_failed_baseline_captures_on_first_tick() {
    let device = device();
    device.push_missing_dump();
    device.push_screen(screen("Home", "10:00"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device.clone(), out.path(), &fast_config());

    detector.start().unwrap();
    wait_for(|| device.dump_count() >= 5);
    let records = detector.stop();

    let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["initial", "change_1"]);
}

#[test]
fn test_screenshot_failure_does_not_stop_polling() {
    let device = device();
    device.fail_screenshots(true);
    device.push_screen(screen("Home", "10:00"));
    device.push_screen(screen("Cart", "10:00"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device.clone(), out.path(), &fast_config());

    detector.start().unwrap();
    wait_for(|| device.dump_count() >= 4);
    assert!(detector.is_running());
    let records = detector.stop();

    assert!(records.is_empty());
    assert!(device.dump_count() >= 4);
}

#[test]
fn test_no_capture_after_stop() {
    let device = device();
    device.set_screen(screen("A", "10:00"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device.clone(), out.path(), &fast_config());

    detector.start().unwrap();
    wait_for(|| device.dump_count() >= 3);
    let records = detector.stop();
    assert!(!detector.is_running());

    let dumps = device.dump_count();
    device.set_screen(screen("B", "10:00"));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(device.dump_count(), dumps);
    assert_eq!(device.screenshots(), records.len());
}

#[test]
fn test_start_twice_is_rejected() {
    let device = device();
    device.set_screen(screen("Home", "10:00"));
    let out = tempfile::tempdir().unwrap();
    let mut detector = ChangeDetector::new(device, out.path(), &fast_config());

    detector.start().unwrap();
    assert!(matches!(detector.start(), Err(MonitorError::AlreadyRunning)));
    detector.stop();
}

#[test]
fn test_config_defaults() {
    let config: DetectorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.interval(), Duration::from_secs(2));
    assert_eq!(config.screenshot_dir, "screenshots");
}
