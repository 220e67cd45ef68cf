use std::fs;
use std::path::PathBuf;

use relkit_core::manifest::{self, DependencySource, Manifest};
use relkit_core::Error;
use tempfile::TempDir;

const SUITE: &str = r#"# Suite manifest
[tool.poetry]
name = "suite"
version = "0.4.0"   # keep in sync
package-mode = false

[tool.poetry.dependencies]
python = "^3.10"
requests = { version = "^2.31" }
core = { path = "libs/core", develop = true }
plugin = { git = "https://github.com/acme/plugins.git", branch = "dev", subdirectory = "plugin-a", optional = true }
tools = { git = "git@github.com:acme/tools.git" }
broken = { path = "x", git = "https://github.com/acme/x.git" }

[tool.poetry.extras]
plugins = ["plugin"]
"#;

fn parse(content: &str) -> Manifest {
    Manifest::parse_str(content, "suite/pyproject.toml").unwrap()
}

#[test]
fn test_unmodified_manifest_round_trips() {
    let manifest = parse(SUITE);
    assert_eq!(manifest.to_toml_string(), SUITE);
}

#[test]
fn test_identity_fields() {
    let manifest = parse(SUITE);
    assert_eq!(manifest.name(), "suite");
    assert_eq!(manifest.version().as_deref(), Some("0.4.0"));
    assert_eq!(manifest.directory(), PathBuf::from("suite"));
    assert!(!manifest.package_mode());
}

#[test]
fn test_project_table_fallback() {
    let manifest = parse(
        r#"[project]
name = "modern"
version = "2.1.0"

[tool.poetry]
"#,
    );
    assert_eq!(manifest.name(), "modern");
    assert_eq!(manifest.version().as_deref(), Some("2.1.0"));
    assert!(manifest.package_mode());
}

#[test]
fn test_dependency_sources() {
    let manifest = parse(SUITE);
    let deps = manifest.dependencies();
    let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["python", "requests", "core", "plugin", "tools", "broken"]
    );

    assert_eq!(deps[0].source, DependencySource::Registry("^3.10".to_string()));
    assert_eq!(deps[1].source, DependencySource::Registry("^2.31".to_string()));
    assert_eq!(deps[2].source, DependencySource::Path(PathBuf::from("libs/core")));
    assert_eq!(deps[5].source, DependencySource::Conflicting);

    let git = manifest.git_dependencies();
    assert_eq!(git.len(), 2);
    assert_eq!(git[0].name, "plugin");
    assert_eq!(git[0].branch, "dev");
    assert_eq!(git[0].subdirectory, "plugin-a");
    assert!(git[0].optional);
    assert_eq!(git[1].branch, "main");
    assert_eq!(git[1].subdirectory, "");
    assert!(!git[1].optional);

    let paths = manifest.path_dependencies();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].name, "core");
}

#[test]
fn test_extras_absent_and_present() {
    let manifest = parse(SUITE);
    let extras = manifest.extras().unwrap();
    assert_eq!(extras["plugins"], vec!["plugin".to_string()]);

    let plain = parse("[tool.poetry]\nname = \"x\"\n");
    assert!(plain.extras().is_none());
}

#[test]
fn test_set_version_preserves_comments() {
    let mut manifest = parse(SUITE);
    manifest.set_version("0.5.0.dev1").unwrap();
    let rendered = manifest.to_toml_string();
    assert!(rendered.contains(r#"version = "0.5.0.dev1"   # keep in sync"#));
    assert!(rendered.starts_with("# Suite manifest\n"));
}

#[test]
fn test_set_dependency_optional_is_stable() {
    let mut manifest = parse(SUITE);
    manifest.set_dependency_optional("plugin", true).unwrap();
    assert_eq!(manifest.to_toml_string(), SUITE);

    manifest.set_dependency_optional("tools", true).unwrap();
    assert!(manifest.git_dependencies()[1].optional);

    manifest.set_dependency_optional("tools", false).unwrap();
    assert!(!manifest.git_dependencies()[1].optional);
}

#[test]
fn test_prune_extras_drops_removed_names() {
    let mut manifest = parse(
        r#"[tool.poetry]
name = "x"

[tool.poetry.dependencies]
kept = "^1.0"

[tool.poetry.extras]
all = ["kept", "gone"]
"#,
    );
    manifest.prune_extras().unwrap();
    assert_eq!(manifest.extras().unwrap()["all"], vec!["kept".to_string()]);
}

#[test]
fn test_missing_poetry_table_is_structural_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pyproject.toml");
    fs::write(&path, "[project]\nname = \"x\"\n").unwrap();

    assert!(matches!(
        Manifest::read(&path),
        Err(Error::ManifestStructure { .. })
    ));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pyproject.toml");
    fs::write(&path, "[tool.poetry\nname = ").unwrap();

    assert!(matches!(Manifest::read(&path), Err(Error::ManifestParse { .. })));
    assert!(matches!(
        Manifest::read(temp_dir.path().join("missing.toml")),
        Err(Error::ManifestNotFound(_))
    ));
}

#[test]
fn test_pin_path_dependencies_updates_both_sides() {
    let temp_dir = TempDir::new().unwrap();
    let core_dir = temp_dir.path().join("libs").join("core");
    fs::create_dir_all(&core_dir).unwrap();
    fs::write(
        core_dir.join("pyproject.toml"),
        "[tool.poetry]\nname = \"core\"\nversion = \"0.1.0\"\n",
    )
    .unwrap();
    let root = temp_dir.path().join("pyproject.toml");
    fs::write(
        &root,
        r#"[tool.poetry]
name = "suite"
version = "0.1.0"

[tool.poetry.dependencies]
core = { path = "libs/core", develop = true }
missing = { path = "libs/missing" }
"#,
    )
    .unwrap();

    let report = manifest::pin_path_dependencies(&root, "0.2.0", "pyproject.toml").unwrap();
    assert!(!report.success);
    assert_eq!(report.failed().count(), 1);

    let core = Manifest::read(core_dir.join("pyproject.toml")).unwrap();
    assert_eq!(core.version().as_deref(), Some("0.2.0"));

    let rendered = fs::read_to_string(&root).unwrap();
    assert!(rendered.contains(r#"core = { version = "^0.2.0", develop = true }"#));
    assert!(rendered.contains(r#"missing = { version = "^0.2.0" }"#));
}
