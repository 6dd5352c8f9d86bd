use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use droidprobe_capture::config::CorrelatorConfig;
use droidprobe_capture::correlator::{read_flows, FlowCorrelator};
use droidprobe_capture::flow::{
    decode_body, FlowResponse, ObservedResponse, RequestInfo, DECODE_ERROR_MARKER,
};

fn request(url: &str) -> RequestInfo {
    let host = url
        .trim_start_matches("https://")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();
    RequestInfo {
        method: "GET".to_string(),
        url: url.to_string(),
        host,
        headers: BTreeMap::from([("accept".to_string(), "*/*".to_string())]),
    }
}

fn ok(body: &str) -> ObservedResponse {
    ObservedResponse {
        status_code: 200,
        headers: BTreeMap::new(),
        content: BASE64.encode(body),
        decode_error: false,
    }
}

fn correlator() -> (tempfile::TempDir, FlowCorrelator) {
    let dir = tempfile::tempdir().unwrap();
    let correlator = FlowCorrelator::in_dir(dir.path(), &CorrelatorConfig::default()).unwrap();
    (dir, correlator)
}

#[test]
fn test_response_resolves_matching_url_only() {
    let (_dir, correlator) = correlator();
    let a = request("https://api.example.com/a");
    let b = request("https://api.example.com/b");

    correlator.on_request_observed(a.clone());
    correlator.on_request_observed(b.clone());
    assert!(correlator.on_response_observed(&b, Some(ok("bee"))));

    let records = correlator.records();
    assert!(records[0].is_pending());
    assert!(!records[1].is_pending());

    assert!(correlator.on_response_observed(&a, Some(ok("ay"))));
    let records = correlator.records();
    assert_eq!(records[0].request.url, a.url);
    assert_eq!(records[1].request.url, b.url);
    assert_eq!(correlator.pending(), 0);
    match &records[0].response {
        Some(FlowResponse::Received { content, .. }) => assert_eq!(content, "ay"),
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn test_same_url_resolves_first_pending_record() {
    let (_dir, correlator) = correlator();
    let a = request("https://api.example.com/poll");

    correlator.on_request_observed(a.clone());
    correlator.on_request_observed(a.clone());
    correlator.on_response_observed(&a, Some(ok("second-sent, first-answered")));

    let records = correlator.records();
    assert!(!records[0].is_pending());
    assert!(records[1].is_pending());
}

#[test]
fn test_excluded_host_is_never_recorded() {
    let (_dir, correlator) = correlator();
    let control = request("https://api.ldmnq.com/heartbeat");

    assert!(!correlator.on_request_observed(control.clone()));
    assert!(!correlator.on_response_observed(&control, Some(ok("{}"))));
    assert!(correlator.is_empty());
    assert!(!correlator.path().exists());
}

#[test]
fn test_empty_exclusion_keeps_everything() {
    let dir = tempfile::tempdir().unwrap();
    let correlator = FlowCorrelator::new(dir.path().join("flows.json"), "");
    assert!(correlator.on_request_observed(request("https://api.ldmnq.com/x")));
}

#[test]
fn test_unmatched_response_is_ignored() {
    let (_dir, correlator) = correlator();
    let a = request("https://api.example.com/a");
    assert!(!correlator.on_response_observed(&a, Some(ok("late"))));
    assert!(correlator.is_empty());
}

#[test]
fn test_missing_response_marker() {
    let (_dir, correlator) = correlator();
    let a = request("https://api.example.com/stream");
    correlator.on_request_observed(a.clone());
    correlator.on_response_observed(&a, None);

    let json = serde_json::to_value(correlator.records()).unwrap();
    assert_eq!(json[0]["response"]["status"], "No response received");
}

#[test]
fn test_file_is_rewritten_on_every_mutation() {
    let (_dir, correlator) = correlator();
    let a = request("https://api.example.com/a");

    correlator.on_request_observed(a.clone());
    let on_disk = read_flows(correlator.path()).unwrap();
    assert_eq!(on_disk.len(), 1);
    assert!(on_disk[0].is_pending());

    correlator.on_response_observed(&a, Some(ok("done")));
    let on_disk = read_flows(correlator.path()).unwrap();
    assert_eq!(on_disk, correlator.records());

    let raw = std::fs::read_to_string(correlator.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json[0]["response"]["status_code"], 200);
    assert_eq!(json[0]["response"]["content"], "done");
    assert!(raw.contains("\n  {"));
}

#[test]
fn test_non_ascii_body_is_preserved_on_disk() {
    let (_dir, correlator) = correlator();
    let a = request("https://api.example.com/greet");
    correlator.on_request_observed(a.clone());
    correlator.on_response_observed(&a, Some(ok("你好")));

    let raw = std::fs::read_to_string(correlator.path()).unwrap();
    assert!(raw.contains("你好"));
}

#[test]
fn test_decode_body_fallbacks() {
    assert_eq!(decode_body(&BASE64.encode("plain")), "plain");
    assert_eq!(decode_body(""), "");
    assert_eq!(decode_body("not base64!!"), DECODE_ERROR_MARKER);

    let lossy = decode_body(&BASE64.encode([b'o', b'k', 0xff]));
    assert!(lossy.starts_with("ok"));
    assert!(lossy.contains('\u{fffd}'));
}

#[test]
fn test_concurrent_requests_all_recorded() {
    let (_dir, correlator) = correlator();
    let correlator = std::sync::Arc::new(correlator);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let correlator = correlator.clone();
            std::thread::spawn(move || {
                let r = request(&format!("https://api.example.com/{i}"));
                correlator.on_request_observed(r.clone());
                correlator.on_response_observed(&r, Some(ok("x")));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(correlator.len(), 8);
    assert_eq!(correlator.pending(), 0);
    assert_eq!(read_flows(correlator.path()).unwrap().len(), 8);
}
