//! Version control porcelain.

use std::path::Path;

use crate::error::Result;

/// The git operations the release flow needs.
///
/// Methods return the tool's exit code; `Err` is reserved for failures to
/// run the tool at all.
pub trait VersionControl: Send + Sync {
    fn add_all(&self, cwd: &Path) -> Result<i32>;
    fn commit(&self, cwd: &Path, message: &str) -> Result<i32>;
    fn push(&self, cwd: &Path, remote: &str, branch: Option<&str>) -> Result<i32>;
    /// Creates a tag; a message makes it annotated.
    fn tag(&self, cwd: &Path, name: &str, message: Option<&str>) -> Result<i32>;
    fn push_tags(&self, cwd: &Path, remote: &str) -> Result<i32>;
    /// Shallow-clones `branch` of `url` into `dest`.
    fn clone_repo(&self, url: &str, branch: &str, depth: u32, dest: &Path) -> Result<i32>;
}
