//! Per-item and per-stage results.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::runner::CommandOutput;

/// Result of one unit of work: a command in a directory, a file rewrite, a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub path: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn succeeded(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            success: true,
            exit_code: None,
            output: None,
            error: None,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: false,
            exit_code: None,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Builds an outcome from a finished command; success follows the exit code.
    pub fn from_output(path: impl Into<PathBuf>, output: &CommandOutput) -> Self {
        let success = output.success();
        let combined = output.combined();
        Self {
            path: path.into(),
            success,
            exit_code: Some(output.exit_code),
            output: (!combined.is_empty()).then_some(combined),
            error: (!success).then(|| format!("exited with code {}", output.exit_code)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Aggregate result of a stage.
///
/// `success` holds only while every recorded item succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub success: bool,
    pub details: Vec<ItemOutcome>,
}

impl Default for StageReport {
    fn default() -> Self {
        Self::new()
    }
}

impl StageReport {
    pub fn new() -> Self {
        Self {
            success: true,
            details: Vec::new(),
        }
    }

    /// A report consisting of a single failure not tied to any item.
    pub fn failure(path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.push(ItemOutcome::failed(path, error));
        report
    }

    pub fn push(&mut self, outcome: ItemOutcome) {
        self.success &= outcome.success;
        self.details.push(outcome);
    }

    pub fn merge(&mut self, other: StageReport) {
        self.success &= other.success;
        self.details.extend(other.details);
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.details.iter().filter(|d| d.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.details.iter().filter(|d| !d.success)
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}
