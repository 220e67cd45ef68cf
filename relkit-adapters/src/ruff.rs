//! Ruff linter and formatter adapter.

use std::path::PathBuf;

use relkit_core::adapter::LintTool;

#[derive(Debug, Clone)]
pub struct RuffTool {
    program: String,
}

impl Default for RuffTool {
    fn default() -> Self {
        Self::new("ruff")
    }
}

impl RuffTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn with_dirs(&self, subcommand: &str, dirs: &[PathBuf]) -> Vec<String> {
        let mut argv = vec![self.program.clone(), subcommand.to_string()];
        argv.extend(dirs.iter().map(|d| d.to_string_lossy().into_owned()));
        argv
    }
}

impl LintTool for RuffTool {
    fn name(&self) -> &'static str {
        "ruff"
    }

    fn lint_command(&self, dirs: &[PathBuf], fix: bool) -> Vec<String> {
        let mut argv = self.with_dirs("check", dirs);
        if fix {
            argv.push("--fix".to_string());
        }
        argv
    }

    fn format_command(&self, dirs: &[PathBuf]) -> Vec<String> {
        self.with_dirs("format", dirs)
    }
}
