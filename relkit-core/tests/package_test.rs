use relkit_core::manifest::Manifest;
use relkit_core::package::{classify, PackageKind};

fn parse(content: &str) -> Manifest {
    Manifest::parse_str(content, "pyproject.toml").unwrap()
}

#[test]
fn test_package_mode_false_is_aggregator() {
    let manifest = parse(
        r#"[tool.poetry]
name = "suite"
package-mode = false
"#,
    );
    let classification = classify(&manifest);
    assert_eq!(classification.kind, PackageKind::Aggregator);
    assert_eq!(classification.name, "suite");
    assert!(classification.is_aggregator());
}

#[test]
fn test_package_mode_string_false_any_case() {
    for value in ["\"false\"", "\"False\"", "\"FALSE\""] {
        let manifest = parse(&format!(
            "[tool.poetry]\nname = \"suite\"\npackage-mode = {}\n",
            value
        ));
        assert!(classify(&manifest).is_aggregator(), "{}", value);
    }
}

#[test]
fn test_package_mode_defaults_to_package() {
    let manifest = parse("[tool.poetry]\nname = \"core\"\nversion = \"1.0.0\"\n");
    assert_eq!(classify(&manifest).kind, PackageKind::Package);

    let manifest = parse("[tool.poetry]\nname = \"core\"\npackage-mode = true\n");
    assert_eq!(classify(&manifest).kind, PackageKind::Package);

    let manifest = parse("[tool.poetry]\nname = \"core\"\npackage-mode = \"no\"\n");
    assert_eq!(classify(&manifest).kind, PackageKind::Package);
}

#[test]
fn test_unnamed_manifest_reports_unknown() {
    let manifest = parse("[tool.poetry]\npackage-mode = false\n");
    assert_eq!(classify(&manifest).name, "unknown");
}

#[test]
fn test_kind_display() {
    assert_eq!(PackageKind::Aggregator.to_string(), "aggregator");
    assert_eq!(PackageKind::Package.to_string(), "package");
}
