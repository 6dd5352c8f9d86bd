use droidprobe_ui::parse::{parse_bounds, parse_hierarchy, ParseError};
use droidprobe_ui::types::Bounds;

const LOGIN_SCREEN: &str = include_str!("fixtures/login_screen.xml");

#[test]
fn test_parse_fixture_yields_all_nodes_in_order() {
    let elements = parse_hierarchy(LOGIN_SCREEN).unwrap();
    assert_eq!(elements.len(), 10);
    assert_eq!(elements[0].class_name, "android.widget.FrameLayout");
    assert_eq!(elements[2].resource_id, "com.example.shop:id/username");
    assert_eq!(elements[9].text, "Profile");
}

#[test]
fn test_parse_reads_clickable_and_bounds() {
    let elements = parse_hierarchy(LOGIN_SCREEN).unwrap();
    let login = elements.iter().find(|e| e.text == "Login").unwrap();
    assert!(login.clickable);
    assert_eq!(login.bounds, Bounds::new(60, 740, 1020, 860));
    assert_eq!(login.bounds.center(), (540, 800));

    let frame = &elements[0];
    assert!(!frame.clickable);
}

#[test]
fn test_parse_decodes_entities() {
    let elements = parse_hierarchy(LOGIN_SCREEN).unwrap();
    assert!(elements.iter().any(|e| e.text == "Terms & Conditions"));
}

#[test]
fn test_parse_numeric_entities() {
    let xml = r#"<hierarchy><node text="&#25105;&#x7684;" class="android.widget.TextView" bounds="[0,0][1,1]" /></hierarchy>"#;
    let elements = parse_hierarchy(xml).unwrap();
    assert_eq!(elements[0].text, "我的");
}

#[test]
fn test_missing_attributes_default_to_empty() {
    let xml = r#"<hierarchy><node class="android.view.View" /></hierarchy>"#;
    let elements = parse_hierarchy(xml).unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].text, "");
    assert_eq!(elements[0].resource_id, "");
    assert!(!elements[0].clickable);
    assert_eq!(elements[0].bounds, Bounds::default());
}

#[test]
fn test_dump_without_root_is_rejected() {
    let result = parse_hierarchy("ERROR: could not get idle state.");
    assert!(matches!(result, Err(ParseError::MissingRoot)));
}

#[test]
fn test_empty_hierarchy_has_no_elements() {
    let elements = parse_hierarchy("<hierarchy rotation=\"0\"></hierarchy>").unwrap();
    assert!(elements.is_empty());
}

#[test]
fn test_parse_bounds_rejects_garbage() {
    assert_eq!(parse_bounds("[1,2][3,4]").unwrap(), Bounds::new(1, 2, 3, 4));
    assert!(matches!(
        parse_bounds("[1,2]"),
        Err(ParseError::InvalidBounds { .. })
    ));
}

#[test]
fn test_invalid_bounds_fail_the_parse() {
    let xml = r#"<hierarchy><node class="a" bounds="oops" /></hierarchy>"#;
    assert!(parse_hierarchy(xml).is_err());
}
