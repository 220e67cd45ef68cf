//! Git command-line adapter.

use std::path::Path;
use std::sync::Arc;

use relkit_core::error::Result;
use relkit_core::runner::CommandRunner;
use relkit_core::vcs::VersionControl;

/// [`VersionControl`] implemented by shelling out to `git`.
pub struct GitCli {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl GitCli {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn git(&self, cwd: &Path, args: &[&str]) -> Result<i32> {
        let argv: Vec<String> = std::iter::once(self.program.clone())
            .chain(args.iter().map(|a| a.to_string()))
            .collect();
        let output = self.runner.run(&argv, cwd)?;
        if !output.success() {
            let detail = output.combined();
            if !detail.is_empty() {
                tracing::debug!("[git] {}", detail);
            }
        }
        Ok(output.exit_code)
    }
}

impl VersionControl for GitCli {
    fn add_all(&self, cwd: &Path) -> Result<i32> {
        self.git(cwd, &["add", "--all"])
    }

    fn commit(&self, cwd: &Path, message: &str) -> Result<i32> {
        self.git(cwd, &["commit", "-m", message])
    }

    fn push(&self, cwd: &Path, remote: &str, branch: Option<&str>) -> Result<i32> {
        match branch {
            Some(branch) => self.git(cwd, &["push", remote, branch]),
            None => self.git(cwd, &["push", remote]),
        }
    }

    fn tag(&self, cwd: &Path, name: &str, message: Option<&str>) -> Result<i32> {
        match message {
            Some(message) => self.git(cwd, &["tag", "-a", name, "-m", message]),
            None => self.git(cwd, &["tag", name]),
        }
    }

    fn push_tags(&self, cwd: &Path, remote: &str) -> Result<i32> {
        self.git(cwd, &["push", "--tags", remote])
    }

    fn clone_repo(&self, url: &str, branch: &str, depth: u32, dest: &Path) -> Result<i32> {
        let cwd = dest.parent().unwrap_or_else(|| Path::new("."));
        let depth = depth.to_string();
        let dest = dest.to_string_lossy();
        self.git(
            cwd,
            &[
                "clone",
                "--depth",
                &depth,
                "--branch",
                branch,
                "--single-branch",
                url,
                &dest,
            ],
        )
    }
}
