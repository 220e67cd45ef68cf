use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use relkit_core::error::{Error, Result};
use relkit_core::manifest::Manifest;
use relkit_core::remote::{raw_manifest_url, ManifestFetcher, RemoteVersionResolver};
use relkit_core::reporter::SilentReporter;
use relkit_core::targets::TargetSpec;
use tempfile::TempDir;

const BASE: &str = "https://raw.example.test";

#[derive(Default)]
struct CannedFetcher {
    responses: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl CannedFetcher {
    fn serve(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), body.to_string());
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl ManifestFetcher for CannedFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses.get(url).cloned().ok_or_else(|| Error::Fetch {
            url: url.to_string(),
            message: "404 Not Found".to_string(),
        })
    }
}

fn resolver(fetcher: &CannedFetcher) -> RemoteVersionResolver<'_> {
    RemoteVersionResolver::new(fetcher).with_raw_content_base(BASE)
}

fn write(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("pyproject.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_raw_manifest_url_forms() {
    assert_eq!(
        raw_manifest_url("https://github.com/acme/lib.git", "main", "", BASE, "pyproject.toml")
            .as_deref(),
        Some("https://raw.example.test/acme/lib/main/pyproject.toml")
    );
    assert_eq!(
        raw_manifest_url("git@github.com:acme/lib.git", "dev", "pkgs/a/", BASE, "pyproject.toml")
            .as_deref(),
        Some("https://raw.example.test/acme/lib/dev/pkgs/a/pyproject.toml")
    );
    assert!(raw_manifest_url("https://gitlab.com/acme/lib.git", "main", "", BASE, "pyproject.toml")
        .is_none());
}

#[test]
fn test_git_dependency_becomes_version_constraint() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        temp_dir.path(),
        r#"[tool.poetry]
name = "app"
version = "1.0.0"

[tool.poetry.dependencies]
python = "^3.10"
lib = { git = "https://github.com/acme/lib.git", branch = "main" }
"#,
    );
    let fetcher = CannedFetcher::default().serve(
        "https://raw.example.test/acme/lib/main/pyproject.toml",
        "[tool.poetry]\nname = \"lib\"\nversion = \"2.3.0\"\n",
    );

    let outcome = resolver(&fetcher).rewrite(&path);
    assert!(outcome.success);

    let rendered = fs::read_to_string(&path).unwrap();
    assert!(rendered.contains(r#"lib = { version = "^2.3.0" }"#));
    assert!(rendered.contains(r#"python = "^3.10""#));
}

#[test]
fn test_rewrite_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        temp_dir.path(),
        r#"[tool.poetry]
name = "app"

[tool.poetry.dependencies]
lib = { git = "https://github.com/acme/lib.git", optional = true }

[tool.poetry.extras]
full = ["lib"]
"#,
    );
    let fetcher = CannedFetcher::default().serve(
        "https://raw.example.test/acme/lib/main/pyproject.toml",
        "[tool.poetry]\nversion = \"0.9.1\"\n",
    );

    assert!(resolver(&fetcher).rewrite(&path).success);
    let first = fs::read_to_string(&path).unwrap();
    assert!(first.contains(r#"lib = { version = "^0.9.1", optional = true }"#));
    assert!(first.contains(r#"full = ["lib"]"#));

    assert!(resolver(&fetcher).rewrite(&path).success);
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn test_non_github_dependency_is_left_alone() {
    let temp_dir = TempDir::new().unwrap();
    let original = r#"[tool.poetry]
name = "app"

[tool.poetry.dependencies]
lib = { git = "https://gitlab.com/acme/lib.git", branch = "main" }
"#;
    let path = write(temp_dir.path(), original);
    let fetcher = CannedFetcher::default();

    let outcome = resolver(&fetcher).rewrite(&path);
    assert!(outcome.success);
    assert!(fetcher.requests().is_empty());
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_failed_fetch_keeps_git_source_and_extras_optionality() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        temp_dir.path(),
        r#"[tool.poetry]
name = "app"

[tool.poetry.dependencies]
lib = { git = "https://github.com/acme/lib.git" }

[tool.poetry.extras]
full = ["lib"]
"#,
    );
    let fetcher = CannedFetcher::default();

    assert!(resolver(&fetcher).rewrite(&path).success);
    assert_eq!(fetcher.requests().len(), 1);

    let manifest = Manifest::read(&path).unwrap();
    let git = manifest.git_dependencies();
    assert_eq!(git.len(), 1);
    assert!(git[0].optional);
}

#[test]
fn test_manifest_without_git_dependencies_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let original = "# header\n[tool.poetry]\nname = \"plain\"   # name\n\n[tool.poetry.dependencies]\nrequests = \"^2\"\n";
    let path = write(temp_dir.path(), original);
    let fetcher = CannedFetcher::default();

    assert!(resolver(&fetcher).rewrite(&path).success);
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_extras_are_pruned_but_never_synthesized() {
    let mut manifest = Manifest::parse_str(
        r#"[tool.poetry]
name = "app"

[tool.poetry.dependencies]
lib = { git = "https://github.com/acme/lib.git" }
"#,
        "pyproject.toml",
    )
    .unwrap();
    let fetcher = CannedFetcher::default().serve(
        "https://raw.example.test/acme/lib/main/pyproject.toml",
        "[tool.poetry]\nversion = \"1.0.0\"\n",
    );

    assert_eq!(resolver(&fetcher).apply(&mut manifest).unwrap(), 1);
    assert!(manifest.extras().is_none());
    assert!(!manifest.to_toml_string().contains("extras"));
}

#[test]
fn test_missing_poetry_table_is_recorded_per_file() {
    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("good");
    let bad = temp_dir.path().join("bad");
    fs::create_dir_all(&good).unwrap();
    fs::create_dir_all(&bad).unwrap();
    write(&good, "[tool.poetry]\nname = \"good\"\n");
    write(&bad, "[project]\nname = \"bad\"\n");
    let fetcher = CannedFetcher::default();

    let report = resolver(&fetcher)
        .rewrite_bulk(
            &TargetSpec::directory(temp_dir.path(), true),
            None,
            &SilentReporter,
        )
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.len(), 2);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].path.starts_with(&bad));
}

#[test]
fn test_single_output_is_ignored_for_multiple_targets() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["a", "b"] {
        let dir = temp_dir.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        write(
            &dir,
            "[tool.poetry]\nname = \"x\"\n\n[tool.poetry.dependencies]\nlib = { git = \"https://github.com/acme/lib.git\" }\n",
        );
    }
    let output = temp_dir.path().join("out.toml");
    let fetcher = CannedFetcher::default().serve(
        "https://raw.example.test/acme/lib/main/pyproject.toml",
        "[tool.poetry]\nversion = \"3.0.0\"\n",
    );

    let report = resolver(&fetcher)
        .rewrite_bulk(
            &TargetSpec::directory(temp_dir.path(), true),
            Some(&output),
            &SilentReporter,
        )
        .unwrap();

    assert!(report.success);
    assert!(!output.exists());
    for name in ["a", "b"] {
        let rendered = fs::read_to_string(temp_dir.path().join(name).join("pyproject.toml")).unwrap();
        assert!(rendered.contains(r#"lib = { version = "^3.0.0" }"#));
    }
}

#[test]
fn test_single_output_writes_elsewhere() {
    let temp_dir = TempDir::new().unwrap();
    let original = "[tool.poetry]\nname = \"x\"\n\n[tool.poetry.dependencies]\nlib = { git = \"https://github.com/acme/lib.git\" }\n";
    let path = write(temp_dir.path(), original);
    let output = temp_dir.path().join("out.toml");
    let fetcher = CannedFetcher::default().serve(
        "https://raw.example.test/acme/lib/main/pyproject.toml",
        "[tool.poetry]\nversion = \"3.0.0\"\n",
    );

    let outcome = resolver(&fetcher).rewrite_to(&path, Some(&output));
    assert!(outcome.success);
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    assert!(fs::read_to_string(&output).unwrap().contains("^3.0.0"));
}
