use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use relkit_core::error::Result;
use relkit_core::vcs::VersionControl;
use relkit_core::walker::{sanitize_branch, CloneRoot, DependencyWalker, Resolution};
use tempfile::TempDir;

/// Materializes a clone by creating one manifest per configured subdirectory.
#[derive(Default)]
struct FakeVcs {
    layouts: HashMap<String, Vec<&'static str>>,
    failing: Vec<String>,
    clones: Mutex<Vec<(String, String, u32, PathBuf)>>,
}

impl FakeVcs {
    fn with_repo(mut self, url: &str, subdirectories: Vec<&'static str>) -> Self {
        self.layouts.insert(url.to_string(), subdirectories);
        self
    }

    fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    fn clones(&self) -> Vec<(String, String, u32, PathBuf)> {
        self.clones.lock().unwrap().clone()
    }
}

impl VersionControl for FakeVcs {
    fn add_all(&self, _cwd: &Path) -> Result<i32> {
        Ok(0)
    }

    fn commit(&self, _cwd: &Path, _message: &str) -> Result<i32> {
        Ok(0)
    }

    fn push(&self, _cwd: &Path, _remote: &str, _branch: Option<&str>) -> Result<i32> {
        Ok(0)
    }

    fn tag(&self, _cwd: &Path, _name: &str, _message: Option<&str>) -> Result<i32> {
        Ok(0)
    }

    fn push_tags(&self, _cwd: &Path, _remote: &str) -> Result<i32> {
        Ok(0)
    }

    fn clone_repo(&self, url: &str, branch: &str, depth: u32, dest: &Path) -> Result<i32> {
        self.clones
            .lock()
            .unwrap()
            .push((url.to_string(), branch.to_string(), depth, dest.to_path_buf()));
        if self.failing.iter().any(|u| u == url) {
            return Ok(128);
        }
        for sub in self.layouts.get(url).cloned().unwrap_or_default() {
            let dir = dest.join(sub);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("pyproject.toml"), "[tool.poetry]\nname = \"cloned\"\n")?;
        }
        Ok(0)
    }
}

fn write_root(dir: &Path, dependencies: &str) -> PathBuf {
    let path = dir.join("pyproject.toml");
    fs::write(
        &path,
        format!(
            "[tool.poetry]\nname = \"suite\"\npackage-mode = false\n\n[tool.poetry.dependencies]\n{}",
            dependencies
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_shared_repository_is_cloned_once() {
    let workspace = TempDir::new().unwrap();
    let clones = TempDir::new().unwrap();
    let root = write_root(
        workspace.path(),
        r#"alpha = { git = "https://github.com/acme/mono.git", branch = "main", subdirectory = "alpha" }
beta = { git = "https://github.com/acme/mono.git", branch = "main", subdirectory = "beta" }
"#,
    );
    let vcs = FakeVcs::default().with_repo("https://github.com/acme/mono.git", vec!["alpha", "beta"]);

    let walker = DependencyWalker::new(&vcs, "pyproject.toml", clones.path());
    let expansion = walker.expand(&root).unwrap();

    assert_eq!(vcs.clones().len(), 1);
    let (url, branch, depth, _) = &vcs.clones()[0];
    assert_eq!(url, "https://github.com/acme/mono.git");
    assert_eq!(branch, "main");
    assert_eq!(*depth, 1);

    assert!(expansion.all_resolved());
    let git_items = expansion.git_items();
    assert_eq!(git_items.len(), 2);
    assert!(git_items[0].1.ends_with("main/alpha"));
    assert!(git_items[1].1.ends_with("main/beta"));

    let root_dir = expansion.clone_root.unwrap();
    assert!(root_dir.path().starts_with(clones.path()));
    root_dir.release().unwrap();
    assert_eq!(fs::read_dir(clones.path()).unwrap().count(), 0);
}

#[test]
fn test_distinct_branches_get_distinct_clones() {
    let workspace = TempDir::new().unwrap();
    let clones = TempDir::new().unwrap();
    let root = write_root(
        workspace.path(),
        r#"one = { git = "https://github.com/acme/one.git" }
two = { git = "https://github.com/acme/two.git" }
three = { git = "https://github.com/acme/one.git", branch = "feature/x" }
"#,
    );
    let vcs = FakeVcs::default()
        .with_repo("https://github.com/acme/one.git", vec![""])
        .with_repo("https://github.com/acme/two.git", vec![""]);

    let expansion = DependencyWalker::new(&vcs, "pyproject.toml", clones.path())
        .expand(&root)
        .unwrap();

    let destinations: Vec<PathBuf> = vcs.clones().into_iter().map(|c| c.3).collect();
    assert_eq!(destinations.len(), 3);
    assert!(destinations[0].ends_with("main"));
    assert!(destinations[1].ends_with("main-2"));
    assert!(destinations[2].ends_with("feature_x"));

    assert!(expansion.all_resolved());
    let names: Vec<&str> = expansion.git_items().iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["one", "two", "three"]);

    expansion.clone_root.unwrap().release().unwrap();
}

#[test]
fn test_invalid_path_dependency_is_unresolved() {
    let workspace = TempDir::new().unwrap();
    let lib = workspace.path().join("libs").join("good");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("pyproject.toml"), "[tool.poetry]\nname = \"good\"\n").unwrap();
    let root = write_root(
        workspace.path(),
        "good = { path = \"libs/good\" }\nbad = { path = \"libs/bad\" }\n",
    );
    let vcs = FakeVcs::default();

    let expansion = DependencyWalker::new(&vcs, "pyproject.toml", workspace.path())
        .expand(&root)
        .unwrap();

    assert!(expansion.clone_root.is_none());
    assert!(vcs.clones().is_empty());
    assert_eq!(expansion.path_items(), vec![lib.as_path()]);
    let failures = expansion.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "bad");
    assert!(!expansion.all_resolved());
}

#[test]
fn test_failed_clone_marks_every_dependency_of_the_group() {
    let workspace = TempDir::new().unwrap();
    let clones = TempDir::new().unwrap();
    let root = write_root(
        workspace.path(),
        r#"a = { git = "https://github.com/acme/gone.git", subdirectory = "a" }
b = { git = "https://github.com/acme/gone.git", subdirectory = "b" }
"#,
    );
    let vcs = FakeVcs::default().failing("https://github.com/acme/gone.git");

    let expansion = DependencyWalker::new(&vcs, "pyproject.toml", clones.path())
        .expand(&root)
        .unwrap();

    assert_eq!(vcs.clones().len(), 1);
    assert_eq!(expansion.failures().len(), 2);
    assert!(expansion.failures()[0].reason.contains("128"));
    expansion.clone_root.unwrap().release().unwrap();
}

#[test]
fn test_subdirectory_outside_clone_is_rejected() {
    let workspace = TempDir::new().unwrap();
    let clones = TempDir::new().unwrap();
    let root = write_root(
        workspace.path(),
        r#"inside = { git = "https://github.com/acme/mono.git", subdirectory = "pkgs/inside" }
escape = { git = "https://github.com/acme/mono.git", subdirectory = "../../etc" }
absolute = { git = "https://github.com/acme/mono.git", subdirectory = "/etc" }
"#,
    );
    let vcs = FakeVcs::default().with_repo("https://github.com/acme/mono.git", vec!["pkgs/inside"]);

    let expansion = DependencyWalker::new(&vcs, "pyproject.toml", clones.path())
        .expand(&root)
        .unwrap();

    let clone_root = expansion.clone_root.as_ref().unwrap().path().to_path_buf();
    let outcomes: Vec<(&str, bool)> = expansion
        .entries
        .iter()
        .map(|entry| (entry.name(), matches!(entry, Resolution::Resolved(_))))
        .collect();
    assert_eq!(
        outcomes,
        vec![("inside", true), ("escape", false), ("absolute", false)]
    );
    assert!(expansion
        .entries
        .iter()
        .all(|entry| entry.location().starts_with(&clone_root)));

    expansion.clone_root.unwrap().release().unwrap();
}

#[test]
fn test_clone_root_keep_leaves_directory() {
    let parent = TempDir::new().unwrap();
    let root = CloneRoot::create_in(parent.path()).unwrap();
    let kept = root.keep();
    assert!(kept.is_dir());
    assert!(kept
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("relkit-clones-"));
}

#[test]
fn test_sanitize_branch() {
    assert_eq!(sanitize_branch("main"), "main");
    assert_eq!(sanitize_branch("feature/x"), "feature_x");
}
