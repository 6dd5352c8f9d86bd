use droidprobe_ui::fingerprint::{fingerprint, normalize};

const LOGIN_SCREEN: &str = include_str!("fixtures/login_screen.xml");

#[test]
fn test_fingerprint_is_deterministic() {
    assert_eq!(fingerprint(LOGIN_SCREEN), fingerprint(LOGIN_SCREEN));
}

#[test]
fn test_clock_change_keeps_fingerprint() {
    let later = LOGIN_SCREEN.replace("text=\"12:30\"", "text=\"12:31\"");
    assert_ne!(later, LOGIN_SCREEN);
    assert_eq!(fingerprint(LOGIN_SCREEN), fingerprint(&later));
}

#[test]
fn test_content_desc_change_keeps_fingerprint() {
    let changed = LOGIN_SCREEN.replace("content-desc=\"Username\"", "content-desc=\"Enter your name\"");
    assert_ne!(changed, LOGIN_SCREEN);
    assert_eq!(fingerprint(LOGIN_SCREEN), fingerprint(&changed));
}

#[test]
fn test_clock_tokens_inside_longer_labels_are_masked() {
    // Any H:MM token is treated as a clock, even mid-label, so a countdown
    // or a score written as "2:45" is not a change on its own.
    let timer = |value: &str| {
        LOGIN_SCREEN.replace("text=\"Login\"", &format!("text=\"Ends in {value} min\""))
    };
    assert_eq!(fingerprint(&timer("2:45")), fingerprint(&timer("2:44")));

    // The rest of the label still counts, as do longer digit runs.
    assert_ne!(
        fingerprint(&timer("2:45")),
        fingerprint(&timer("2:45").replace("Ends in", "Starts in"))
    );
    assert_ne!(fingerprint(&timer("2:450")), fingerprint(&timer("2:451")));
}

#[test]
fn test_text_change_changes_fingerprint() {
    let changed = LOGIN_SCREEN.replace("text=\"Login\"", "text=\"Sign in\"");
    assert_ne!(fingerprint(LOGIN_SCREEN), fingerprint(&changed));
}

#[test]
fn test_new_node_changes_fingerprint() {
    let changed = LOGIN_SCREEN.replace(
        "</hierarchy>",
        "<node text=\"Welcome\" class=\"android.widget.TextView\" bounds=\"[0,0][1,1]\" /></hierarchy>",
    );
    assert_ne!(fingerprint(LOGIN_SCREEN), fingerprint(&changed));
}

#[test]
fn test_normalize_strips_volatile_content() {
    let raw = r#"<node text="9:05" content-desc="battery 80%" class="x" />"#;
    let normalized = normalize(raw);
    assert!(!normalized.contains("9:05"));
    assert!(!normalized.contains("battery"));
    assert!(normalized.contains("class=\"x\""));
}

#[test]
fn test_display_is_32_hex_digits() {
    let fp = fingerprint("<hierarchy></hierarchy>");
    let hex = fp.to_string();
    assert_eq!(hex.len(), 32);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(hex.ends_with(&fp.short()));
}
