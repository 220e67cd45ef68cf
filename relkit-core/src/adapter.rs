//! Tool adapter traits for building argument vectors of external tools.
//!
//! Adapters only describe commands. Running them is the job of a
//! [`CommandRunner`](crate::runner::CommandRunner), which keeps tool-specific
//! flags out of the pipeline and lets tests substitute fakes.

use std::fmt;
use std::path::PathBuf;

/// Credentials and target index for publishing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PublishCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub repository: Option<String>,
}

impl fmt::Debug for PublishCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("repository", &self.repository)
            .finish()
    }
}

/// The package manager: locks, installs, builds, publishes and runs tests.
pub trait PackageTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn lock_command(&self) -> Vec<String>;
    fn install_command(&self, all_extras: bool) -> Vec<String>;
    fn build_command(&self) -> Vec<String>;
    fn publish_command(&self, credentials: &PublishCredentials) -> Vec<String>;
    /// `workers` above 1 requests parallel test execution.
    fn test_command(&self, workers: usize) -> Vec<String>;
}

/// The linter and formatter.
pub trait LintTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn lint_command(&self, dirs: &[PathBuf], fix: bool) -> Vec<String>;
    fn format_command(&self, dirs: &[PathBuf]) -> Vec<String>;
}
