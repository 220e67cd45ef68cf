//! Trait for reporting pipeline progress.

use std::path::Path;

use crate::analyze::Analysis;
use crate::outcome::{ItemOutcome, StageReport};
use crate::pipeline::Stage;
use crate::release::VersionUpdate;

/// Receives progress events so the core library never writes to stdout/stderr itself.
///
/// Every method has an empty default; implementors override what they display.
pub trait PipelineReporter: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    /// `index` is 1-based.
    fn item_started(&self, _stage: Stage, _index: usize, _total: usize, _path: &Path) {}

    fn item_finished(&self, _stage: Stage, _outcome: &ItemOutcome) {}

    fn stage_finished(&self, _stage: Stage, _report: &StageReport) {}

    fn version_changed(&self, _update: &VersionUpdate, _dry_run: bool) {}

    fn analysis(&self, _analysis: &Analysis) {}

    fn warning(&self, _stage: Stage, _message: &str) {}
}

/// Reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl PipelineReporter for SilentReporter {}
