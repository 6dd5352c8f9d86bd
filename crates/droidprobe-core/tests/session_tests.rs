use std::path::{Path, PathBuf};
use std::sync::Arc;

use droidprobe_capture::config::CorrelatorConfig;
use droidprobe_capture::correlator::FlowCorrelator;
use droidprobe_capture::interceptor::ReplayFeed;
use droidprobe_core::config::ProbeConfig;
use droidprobe_core::inspect::FixedPackage;
use droidprobe_core::limits::StopReason;
use droidprobe_core::report::{NetworkFlows, SessionReport, StaticAnalysis};
use droidprobe_core::session::{Session, SessionError};
use droidprobe_device::scripted::{Interaction, ScriptedDevice};
use droidprobe_ui::types::ScreenSize;

const LOGIN_SCREEN: &str = include_str!("../../droidprobe-ui/tests/fixtures/login_screen.xml");
const FLOWS: &str = include_str!("fixtures/flows.jsonl");
const PACKAGE: &str = "com.example.shop";

fn fast_config() -> ProbeConfig {
    let mut config = ProbeConfig::default();
    config.limits.test_duration_secs = 0.3;
    config.limits.step_interval_secs = 0.02;
    config.detector.interval_secs = 0.02;
    config.explore.focus_settle_secs = 0.0;
    config.explore.confirm_settle_secs = 0.0;
    config
}

struct Fixture {
    _root: tempfile::TempDir,
    apk: PathBuf,
    output: PathBuf,
    device: Arc<ScriptedDevice>,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let apk = root.path().join("shop.apk");
    std::fs::write(&apk, b"PK\x03\x04 not really a zip").unwrap();
    let output = root.path().join("shop_20240501_090307");
    let device = Arc::new(ScriptedDevice::with_screen(
        ScreenSize::new(1080, 1920),
        LOGIN_SCREEN,
    ));
    Fixture {
        _root: root,
        apk,
        output,
        device,
    }
}

fn session(fx: &Fixture, config: ProbeConfig) -> Session<ScriptedDevice> {
    let session = Session::new(
        fx.device.clone(),
        config,
        fx.output.clone(),
        Box::new(FixedPackage::new(PACKAGE)),
    )
    .unwrap();
    let correlator =
        FlowCorrelator::in_dir(session.output_dir(), &CorrelatorConfig::default()).unwrap();
    session.with_interceptor(Box::new(ReplayFeed::new(Arc::new(correlator), FLOWS)))
}

fn position(interactions: &[Interaction], wanted: &Interaction) -> usize {
    interactions
        .iter()
        .position(|i| i == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} not in {interactions:?}"))
}

#[test]
fn test_complete_session_produces_full_report() {
    let fx = fixture();
    let outcome = session(&fx, fast_config()).run(&fx.apk).unwrap();
    let report = &outcome.report;

    assert_eq!(report.stop_reason, StopReason::Complete);
    assert!(report.error.is_none());
    assert!(report.test_end_time.unwrap() >= report.test_start_time);
    assert_eq!(report.package_name(), Some(PACKAGE));

    // Install lifecycle is ordered and the app is removed at the end.
    let interactions = fx.device.interactions();
    let install = position(&interactions, &Interaction::Install(fx.apk.clone()));
    let launch = position(&interactions, &Interaction::Launch(PACKAGE.to_string()));
    assert!(install < launch);
    assert_eq!(
        interactions.first(),
        Some(&Interaction::Uninstall(PACKAGE.to_string()))
    );
    assert_eq!(
        interactions.last(),
        Some(&Interaction::Uninstall(PACKAGE.to_string()))
    );

    // The engine ran and typed into the login form.
    assert!(report.exploration.actions > 0);
    assert!(interactions
        .iter()
        .any(|i| matches!(i, Interaction::SetText(_, text) if text == "testuser")));

    // Typing changes the screen, so change captures may follow the initial one.
    let names: Vec<String> = report
        .screenshots
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names[0].starts_with("initial_"));
    assert!(names[1..].iter().all(|n| n.starts_with("change_")));
    assert!(report
        .screenshots
        .iter()
        .all(|p| p.starts_with(fx.output.join("screenshots"))));

    match &report.network_flows {
        Some(NetworkFlows::Records(records)) => {
            assert_eq!(records.len(), 2);
            assert!(!records[0].is_pending());
            assert!(records[1].is_pending());
        }
        other => panic!("unexpected flows {other:?}"),
    }
}

#[test]
fn test_report_file_round_trips_with_four_space_indent() {
    let fx = fixture();
    let outcome = session(&fx, fast_config()).run(&fx.apk).unwrap();

    assert_eq!(outcome.report_path, fx.output.join("final_report.json"));
    let raw = std::fs::read_to_string(&outcome.report_path).unwrap();
    assert!(raw.starts_with("{\n    \""));

    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["stop_reason"], "complete");
    assert_eq!(json["static_analysis"]["package_name"], PACKAGE);
    assert!(json["exploration"]["by_handler"].is_object());

    let read_back = SessionReport::read(&outcome.report_path).unwrap();
    assert_eq!(read_back, outcome.report);
}

#[test]
fn test_install_failure_still_cleans_up() {
    let fx = fixture();
    fx.device.fail_install(true);
    let outcome = session(&fx, fast_config()).run(&fx.apk).unwrap();
    let report = &outcome.report;

    assert_eq!(report.stop_reason, StopReason::InstallFailed);
    assert!(report.error.as_deref().unwrap().contains("INSTALL_FAILED"));
    assert!(report.screenshots.is_empty());
    assert_eq!(report.exploration.steps, 0);
    assert!(outcome.report_path.exists());

    let interactions = fx.device.interactions();
    assert!(!interactions
        .iter()
        .any(|i| matches!(i, Interaction::Launch(_))));
    assert_eq!(
        interactions.last(),
        Some(&Interaction::Uninstall(PACKAGE.to_string()))
    );
    // Capture had started before the install, so its flows are kept.
    assert!(matches!(
        report.network_flows,
        Some(NetworkFlows::Records(_))
    ));
}

#[test]
fn test_launch_failure_stops_before_exploring() {
    let fx = fixture();
    fx.device.fail_launch(true);
    let outcome = session(&fx, fast_config()).run(&fx.apk).unwrap();

    assert_eq!(outcome.report.stop_reason, StopReason::LaunchFailed);
    assert_eq!(fx.device.screenshots(), 0);
    assert_eq!(fx.device.clicks().len(), 0);
}

#[test]
fn test_missing_apk_fails_inspection_without_touching_device() {
    let fx = fixture();
    let missing = fx.apk.with_file_name("absent.apk");
    let outcome = session(&fx, fast_config()).run(&missing).unwrap();
    let report = &outcome.report;

    assert_eq!(report.stop_reason, StopReason::InspectionFailed);
    assert!(matches!(
        report.static_analysis,
        Some(StaticAnalysis::Failed { .. })
    ));
    assert!(report.network_flows.is_none());
    assert!(fx.device.interactions().is_empty());
    assert!(outcome.report_path.exists());
}

#[test]
fn test_invalid_policy_aborts_session() {
    let fx = fixture();
    let mut config = fast_config();
    config.explore.policy.confirm_text = "(unclosed".to_string();
    let outcome = session(&fx, config).run(&fx.apk).unwrap();

    assert_eq!(outcome.report.stop_reason, StopReason::Aborted);
    assert!(outcome.report.static_analysis.is_none());
    assert!(fx.device.interactions().is_empty());
}

#[test]
fn test_session_without_interceptor_has_no_flows() {
    let fx = fixture();
    let mut session = Session::new(
        fx.device.clone(),
        fast_config(),
        fx.output.clone(),
        Box::new(FixedPackage::new(PACKAGE)),
    )
    .unwrap();
    let outcome = session.run(&fx.apk).unwrap();

    assert_eq!(outcome.report.stop_reason, StopReason::Complete);
    assert!(outcome.report.network_flows.is_none());
    assert!(Path::new(&outcome.report_path).exists());
}

#[test]
fn test_session_rejects_unusable_config_up_front() {
    let fx = fixture();
    let mut config = fast_config();
    config.detector.interval_secs = -1.0;

    let result = Session::new(
        fx.device.clone(),
        config,
        fx.output.clone(),
        Box::new(FixedPackage::new(PACKAGE)),
    );
    assert!(matches!(result, Err(SessionError::Config(_))));
    assert!(fx.device.interactions().is_empty());
}
