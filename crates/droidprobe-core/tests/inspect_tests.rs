use droidprobe_core::inspect::{
    parse_badging, sha256_file, FixedPackage, InspectError, PackageInspector,
};

const BADGING: &str = include_str!("fixtures/badging.txt");

#[test]
fn test_parse_badging_extracts_package_and_activities() {
    let info = parse_badging(BADGING).unwrap();
    assert_eq!(info.package_name, "com.example.shop");
    assert_eq!(info.version_name.as_deref(), Some("1.2.0"));
    assert_eq!(
        info.launchable_activities,
        vec![
            "com.example.shop.MainActivity",
            "com.example.shop.DeepLinkActivity"
        ]
    );
    assert!(info.file_sha256.is_empty());
}

#[test]
fn test_parse_badging_without_package_line_fails() {
    let result = parse_badging("sdkVersion:'24'\n");
    assert!(matches!(result, Err(InspectError::NoPackageName)));
}

#[test]
fn test_sha256_of_known_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abc.apk");
    std::fs::write(&path, b"abc").unwrap();
    assert_eq!(
        sha256_file(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_fixed_package_hashes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.apk");
    std::fs::write(&path, b"abc").unwrap();

    let info = FixedPackage::new("com.example.shop").inspect(&path).unwrap();
    assert_eq!(info.package_name, "com.example.shop");
    assert_eq!(info.file_sha256.len(), 64);
}

#[test]
fn test_missing_apk_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let result = FixedPackage::new("x").inspect(&dir.path().join("absent.apk"));
    assert!(matches!(result, Err(InspectError::Missing { .. })));
}
