//! Staged execution over resolved packages.
//!
//! A [`Pipeline`] runs one stage at a time, item by item, and records a
//! per-item [`ItemOutcome`] so later stages can continue with only the items
//! that succeeded. Failures inside a stage never stop its remaining items.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::{LintTool, PackageTool, PublishCredentials};
use crate::analyze::{self, Analysis};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::outcome::{ItemOutcome, StageReport};
use crate::package::classify;
use crate::release::{VersionChange, VersionEngine, VersionPlan};
use crate::remote::{ManifestFetcher, RemoteVersionResolver};
use crate::reporter::{PipelineReporter, SilentReporter};
use crate::runner::CommandRunner;
use crate::targets::TargetSpec;
use crate::vcs::VersionControl;
use crate::walker::{resolve_path_dependencies, CloneRoot, DependencyWalker, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lock,
    Install,
    Build,
    Test,
    Analyze,
    RemoteUpdate,
    Publish,
    Version,
    Lint,
    Format,
    Commit,
    Tag,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Lock => "lock",
            Stage::Install => "install",
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Analyze => "analyze",
            Stage::RemoteUpdate => "remote",
            Stage::Publish => "publish",
            Stage::Version => "version",
            Stage::Lint => "lint",
            Stage::Format => "format",
            Stage::Commit => "git",
            Stage::Tag => "tag",
        }
    }

    fn state(self) -> PipelineState {
        match self {
            Stage::Lock => PipelineState::Locking,
            Stage::Install => PipelineState::Installing,
            Stage::Build => PipelineState::Building,
            Stage::Test => PipelineState::Testing,
            Stage::Analyze => PipelineState::Analyzing,
            Stage::RemoteUpdate => PipelineState::Updating,
            Stage::Publish => PipelineState::Publishing,
            Stage::Version => PipelineState::Versioning,
            Stage::Lint | Stage::Format => PipelineState::Linting,
            Stage::Commit | Stage::Tag => PipelineState::Committing,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Versioning,
    Linting,
    Committing,
    Locking,
    Installing,
    Building,
    Testing,
    Analyzing,
    Updating,
    Publishing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the test stage maps targets to test invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TestMode {
    /// One invocation in the resolved directory.
    #[default]
    Single,
    /// One invocation at the top-level directory, covering the whole tree.
    Monorepo,
    /// One invocation per resolved work item.
    Each,
}

impl TestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::Single => "single",
            TestMode::Monorepo => "monorepo",
            TestMode::Each => "each",
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(TestMode::Single),
            "monorepo" => Ok(TestMode::Monorepo),
            "each" => Ok(TestMode::Each),
            other => Err(Error::InvalidArguments(format!(
                "Invalid test mode: {} (expected single, monorepo or each)",
                other
            ))),
        }
    }
}

/// Result of the test stage.
///
/// In each-mode with git dependencies the clones stay on disk; the owner of
/// this value decides when to release [`clone_root`](Self::clone_root).
#[derive(Debug)]
pub struct TestRun {
    pub report: StageReport,
    pub clone_root: Option<CloneRoot>,
    /// Work items materialized from git clones, whether or not they passed.
    pub cloned_items: Vec<PathBuf>,
}

impl TestRun {
    /// Directories whose tests passed, in execution order.
    pub fn passed_items(&self) -> Vec<PathBuf> {
        self.report.succeeded().map(|o| o.path.clone()).collect()
    }
}

/// The external tools a pipeline drives.
#[derive(Clone)]
pub struct Toolchain {
    pub runner: Arc<dyn CommandRunner>,
    pub package_tool: Arc<dyn PackageTool>,
    pub lint_tool: Arc<dyn LintTool>,
    pub vcs: Arc<dyn VersionControl>,
    pub fetcher: Arc<dyn ManifestFetcher>,
}

pub struct Pipeline {
    tools: Toolchain,
    reporter: Arc<dyn PipelineReporter>,
    manifest_name: String,
    raw_content_base: String,
    clone_parent: PathBuf,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(tools: Toolchain, settings: &Settings) -> Self {
        Self {
            tools,
            reporter: Arc::new(SilentReporter),
            manifest_name: settings.manifest_name.clone(),
            raw_content_base: settings.raw_content_base.clone(),
            clone_parent: settings.clone_parent(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PipelineReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_clone_parent(mut self, clone_parent: impl Into<PathBuf>) -> Self {
        self.clone_parent = clone_parent.into();
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn tools(&self) -> &Toolchain {
        &self.tools
    }

    pub fn reporter(&self) -> &Arc<dyn PipelineReporter> {
        &self.reporter
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    fn enter(&mut self, stage: Stage) -> Result<()> {
        let next = stage.state();
        if self.state.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("[{}] {} -> {}", stage, self.state, next);
        self.state = next;
        self.reporter.stage_started(stage);
        Ok(())
    }

    /// Moves the pipeline to `Done` or `Failed`; no stage can run afterwards.
    pub fn finish(&mut self, success: bool) -> PipelineState {
        if !self.state.is_terminal() {
            self.state = if success {
                PipelineState::Done
            } else {
                PipelineState::Failed
            };
        }
        self.state
    }

    fn close(&self, stage: Stage, report: StageReport) -> StageReport {
        if report.success {
            tracing::info!("[{}] Completed successfully", stage);
        } else {
            tracing::error!(
                "[{}] {} of {} item(s) failed",
                stage,
                report.failed().count(),
                report.len()
            );
        }
        self.reporter.stage_finished(stage, &report);
        report
    }

    /// Runs `argv` in `dir` as item `index` of `total`, turning runner errors
    /// into a failed outcome.
    fn run_item(
        &self,
        stage: Stage,
        argv: &[String],
        dir: &Path,
        index: usize,
        total: usize,
    ) -> ItemOutcome {
        tracing::info!("[{}] ({}/{}) {}", stage, index, total, dir.display());
        self.reporter.item_started(stage, index, total, dir);
        let outcome = match self.tools.runner.run(argv, dir) {
            Ok(output) => ItemOutcome::from_output(dir, &output),
            Err(e) => {
                tracing::error!("[{}] {}", stage, e);
                ItemOutcome::failed(dir, e.to_string())
            }
        };
        self.reporter.item_finished(stage, &outcome);
        outcome
    }

    fn run_in_all(&self, stage: Stage, argv: &[String], dirs: &[PathBuf]) -> StageReport {
        let mut report = StageReport::new();
        let total = dirs.len();
        for (index, dir) in dirs.iter().enumerate() {
            report.push(self.run_item(stage, argv, dir, index + 1, total));
        }
        report
    }

    fn unresolved_outcome(&self, stage: Stage, resolution: &Resolution) -> Option<ItemOutcome> {
        match resolution {
            Resolution::Resolved(_) => None,
            Resolution::Unresolved(failure) => {
                tracing::error!(
                    "[{}] Skipping invalid dependency '{}': {}",
                    stage,
                    failure.name,
                    failure.reason
                );
                let outcome = ItemOutcome::failed(&failure.location, failure.reason.clone());
                self.reporter.item_finished(stage, &outcome);
                Some(outcome)
            }
        }
    }

    /// Reads one of `total` target manifests.
    ///
    /// A single target that cannot be read is an error. With several
    /// targets the failure is recorded in `report` and `None` is returned,
    /// so the remaining targets still run.
    fn read_target(
        &self,
        stage: Stage,
        path: &Path,
        total: usize,
        report: &mut StageReport,
    ) -> Result<Option<Manifest>> {
        match Manifest::read(path) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) if total <= 1 => Err(e),
            Err(e) => {
                tracing::error!("[{}] Skipping {}: {}", stage, path.display(), e);
                let outcome = ItemOutcome::failed(path, e.to_string());
                self.reporter.item_finished(stage, &outcome);
                report.push(outcome);
                Ok(None)
            }
        }
    }

    /// Directories a stage runs in for `manifest_path`: the package itself, or
    /// for an aggregator its path dependencies, optionally preceded by the
    /// aggregator's own directory.
    fn package_dirs(
        &self,
        stage: Stage,
        manifest_path: &Path,
        total: usize,
        include_aggregator: bool,
        report: &mut StageReport,
    ) -> Result<Vec<PathBuf>> {
        let Some(manifest) = self.read_target(stage, manifest_path, total, report)? else {
            return Ok(Vec::new());
        };
        let classification = classify(&manifest);
        if !classification.is_aggregator() {
            return Ok(vec![manifest.directory().to_path_buf()]);
        }

        tracing::info!(
            "[{}] '{}' is an aggregator; using its path dependencies",
            stage,
            classification.name
        );
        let mut dirs = Vec::new();
        if include_aggregator {
            dirs.push(manifest.directory().to_path_buf());
        }
        for resolution in resolve_path_dependencies(&manifest, &self.manifest_name) {
            match resolution {
                Resolution::Resolved(item) => dirs.push(item.directory),
                unresolved => {
                    if let Some(outcome) = self.unresolved_outcome(stage, &unresolved) {
                        report.push(outcome);
                    }
                }
            }
        }
        Ok(dirs)
    }

    /// Locks every target; an aggregator is locked itself and so are its path dependencies.
    pub fn lock(&mut self, manifests: &[PathBuf]) -> Result<StageReport> {
        self.enter(Stage::Lock)?;
        let argv = self.tools.package_tool.lock_command();
        let mut report = StageReport::new();
        let mut dirs = Vec::new();
        for manifest in manifests {
            dirs.extend(self.package_dirs(
                Stage::Lock,
                manifest,
                manifests.len(),
                true,
                &mut report,
            )?);
        }
        report.merge(self.run_in_all(Stage::Lock, &argv, &dirs));
        Ok(self.close(Stage::Lock, report))
    }

    /// Installs every target. An aggregator is installed from its own
    /// directory with all extras, which pulls in its path dependencies.
    pub fn install(&mut self, manifests: &[PathBuf], all_extras: bool) -> Result<StageReport> {
        self.enter(Stage::Install)?;
        let mut report = StageReport::new();
        let total = manifests.len();
        for (index, path) in manifests.iter().enumerate() {
            let Some(manifest) = self.read_target(Stage::Install, path, total, &mut report)? else {
                continue;
            };
            let classification = classify(&manifest);
            let extras = all_extras || classification.is_aggregator();
            if classification.is_aggregator() {
                tracing::info!(
                    "[install] '{}' is an aggregator; installing with all extras",
                    classification.name
                );
            }
            let argv = self.tools.package_tool.install_command(extras);
            report.push(self.run_item(Stage::Install, &argv, manifest.directory(), index + 1, total));
        }
        Ok(self.close(Stage::Install, report))
    }

    /// Builds every leaf package; aggregators contribute only their path dependencies.
    pub fn build(&mut self, manifests: &[PathBuf]) -> Result<StageReport> {
        self.enter(Stage::Build)?;
        let argv = self.tools.package_tool.build_command();
        let mut report = StageReport::new();
        let mut dirs = Vec::new();
        for manifest in manifests {
            dirs.extend(self.package_dirs(
                Stage::Build,
                manifest,
                manifests.len(),
                false,
                &mut report,
            )?);
        }
        report.merge(self.run_in_all(Stage::Build, &argv, &dirs));
        Ok(self.close(Stage::Build, report))
    }

    /// Runs the test stage.
    ///
    /// Single and monorepo modes run one invocation in `directory`, or in the
    /// first manifest's directory. Each-mode expands the first manifest when it
    /// is an aggregator and tests every work item; otherwise it tests every
    /// target separately.
    pub fn test(
        &mut self,
        manifests: &[PathBuf],
        directory: Option<&Path>,
        mode: TestMode,
        workers: usize,
    ) -> Result<TestRun> {
        self.enter(Stage::Test)?;
        let argv = self.tools.package_tool.test_command(workers);
        let primary = manifests
            .first()
            .ok_or_else(|| Error::NotFound("no manifest to test".to_string()))?;

        let run = match mode {
            TestMode::Single | TestMode::Monorepo => {
                let dir = directory
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| parent_dir(primary));
                tracing::info!("[test] Running {} tests in {}", mode, dir.display());
                let mut report = StageReport::new();
                report.push(self.run_item(Stage::Test, &argv, &dir, 1, 1));
                TestRun {
                    report,
                    clone_root: None,
                    cloned_items: Vec::new(),
                }
            }
            TestMode::Each => self.test_each(&argv, manifests, primary)?,
        };

        let report = self.close(Stage::Test, run.report);
        Ok(TestRun {
            report,
            clone_root: run.clone_root,
            cloned_items: run.cloned_items,
        })
    }

    fn test_each(&self, argv: &[String], manifests: &[PathBuf], primary: &Path) -> Result<TestRun> {
        let manifest = Manifest::read(primary)?;
        let classification = classify(&manifest);
        let mut report = StageReport::new();

        if !classification.is_aggregator() {
            tracing::info!("[test] No aggregator found; testing each manifest individually");
            report.merge(self.run_in_all(Stage::Test, argv, &manifest_dirs(manifests)));
            return Ok(TestRun {
                report,
                clone_root: None,
                cloned_items: Vec::new(),
            });
        }

        tracing::info!(
            "[test] Aggregator '{}' detected; testing each dependency individually",
            classification.name
        );
        let walker = DependencyWalker::new(
            self.tools.vcs.as_ref(),
            self.manifest_name.clone(),
            self.clone_parent.clone(),
        );
        let expansion = walker.expand_manifest(&manifest);
        let total = expansion.entries.len();

        for (index, entry) in expansion.entries.iter().enumerate() {
            let outcome = match entry {
                Resolution::Resolved(item) => {
                    self.run_item(Stage::Test, argv, &item.directory, index + 1, total)
                }
                unresolved => {
                    self.reporter
                        .item_started(Stage::Test, index + 1, total, unresolved.location());
                    match self.unresolved_outcome(Stage::Test, unresolved) {
                        Some(outcome) => outcome,
                        None => continue,
                    }
                }
            };
            report.push(outcome);
        }

        let cloned_items = expansion
            .git_items()
            .into_iter()
            .map(|(_, dir)| dir.to_path_buf())
            .collect();
        Ok(TestRun {
            report,
            clone_root: expansion.clone_root,
            cloned_items,
        })
    }

    /// Analyzes a test report. Malformed thresholds are errors; an unreadable or
    /// invalid report is a failed stage.
    pub fn analyze(
        &mut self,
        report_path: &Path,
        passed_threshold: Option<&str>,
        skipped_threshold: Option<&str>,
    ) -> Result<(StageReport, Option<Analysis>)> {
        self.enter(Stage::Analyze)?;
        self.reporter.item_started(Stage::Analyze, 1, 1, report_path);

        let (outcome, analysis) =
            match analyze::analyze_file(report_path, passed_threshold, skipped_threshold) {
                Ok(analysis) => {
                    self.reporter.analysis(&analysis);
                    let outcome = if analysis.success {
                        ItemOutcome::succeeded(report_path)
                    } else {
                        let failed: Vec<String> = analysis
                            .threshold_failures
                            .iter()
                            .map(|f| format!("{} {} (actual={:.2}%)", f.metric, f.threshold, f.actual))
                            .collect();
                        ItemOutcome::failed(
                            report_path,
                            format!("threshold conditions not met: {}", failed.join(", ")),
                        )
                    };
                    (outcome, Some(analysis))
                }
                Err(e @ Error::InvalidThreshold { .. }) => return Err(e),
                Err(e) => {
                    tracing::error!("[analyze] {}", e);
                    (ItemOutcome::failed(report_path, e.to_string()), None)
                }
            };

        self.reporter.item_finished(Stage::Analyze, &outcome);
        let mut report = StageReport::new();
        report.push(outcome);
        Ok((self.close(Stage::Analyze, report), analysis))
    }

    /// Rewrites git dependencies of the targeted manifests into version constraints.
    pub fn remote_update(
        &mut self,
        targets: &TargetSpec,
        output: Option<&Path>,
    ) -> Result<StageReport> {
        self.enter(Stage::RemoteUpdate)?;
        let resolver = RemoteVersionResolver::new(self.tools.fetcher.as_ref())
            .with_raw_content_base(self.raw_content_base.clone())
            .with_manifest_name(self.manifest_name.clone());
        let report = resolver.rewrite_bulk(targets, output, self.reporter.as_ref())?;
        Ok(self.close(Stage::RemoteUpdate, report))
    }

    /// Builds and publishes every target; aggregators publish their path dependencies.
    pub fn publish(
        &mut self,
        manifests: &[PathBuf],
        credentials: &PublishCredentials,
    ) -> Result<StageReport> {
        self.enter(Stage::Publish)?;
        let mut report = StageReport::new();
        let mut dirs = Vec::new();
        for manifest in manifests {
            dirs.extend(self.package_dirs(
                Stage::Publish,
                manifest,
                manifests.len(),
                false,
                &mut report,
            )?);
        }
        report.merge(self.build_and_publish(&dirs, credentials));
        Ok(self.close(Stage::Publish, report))
    }

    /// Builds and publishes work items that passed their tests.
    ///
    /// Aggregator directories among `items` are skipped.
    pub fn publish_items(
        &mut self,
        items: &[PathBuf],
        credentials: &PublishCredentials,
    ) -> Result<StageReport> {
        self.enter(Stage::Publish)?;
        let mut report = StageReport::new();
        let mut publishable = Vec::new();

        for dir in items {
            match Manifest::read(dir.join(&self.manifest_name)) {
                Ok(manifest) if classify(&manifest).is_aggregator() => {
                    tracing::info!("[publish] Skipping aggregator {}", dir.display());
                }
                Ok(_) => publishable.push(dir.clone()),
                Err(e) => {
                    tracing::error!("[publish] {}", e);
                    report.push(ItemOutcome::failed(dir, e.to_string()));
                }
            }
        }

        report.merge(self.build_and_publish(&publishable, credentials));
        Ok(self.close(Stage::Publish, report))
    }

    fn build_and_publish(&self, dirs: &[PathBuf], credentials: &PublishCredentials) -> StageReport {
        let build = self.tools.package_tool.build_command();
        let publish = self.tools.package_tool.publish_command(credentials);
        let total = dirs.len();
        let mut report = StageReport::new();

        for (index, dir) in dirs.iter().enumerate() {
            let built = self.run_item(Stage::Build, &build, dir, index + 1, total);
            if !built.success {
                tracing::error!("[publish] Build failed in {}; not publishing", dir.display());
                report.push(built);
                continue;
            }
            report.push(self.run_item(Stage::Publish, &publish, dir, index + 1, total));
        }
        report
    }

    /// Lints `dirs`, optionally applying fixes.
    pub fn lint(&mut self, dirs: &[PathBuf], fix: bool) -> Result<StageReport> {
        self.enter(Stage::Lint)?;
        let argv = self.tools.lint_tool.lint_command(dirs, fix);
        let report = self.run_whole(Stage::Lint, &argv, dirs);
        Ok(self.close(Stage::Lint, report))
    }

    pub fn format(&mut self, dirs: &[PathBuf]) -> Result<StageReport> {
        self.enter(Stage::Format)?;
        let argv = self.tools.lint_tool.format_command(dirs);
        let report = self.run_whole(Stage::Format, &argv, dirs);
        Ok(self.close(Stage::Format, report))
    }

    /// Runs one command covering all `dirs` from the current directory.
    fn run_whole(&self, stage: Stage, argv: &[String], dirs: &[PathBuf]) -> StageReport {
        let cwd = PathBuf::from(".");
        let label = dirs.first().cloned().unwrap_or_else(|| cwd.clone());
        let mut report = StageReport::new();
        let mut outcome = self.run_item(stage, argv, &cwd, 1, 1);
        outcome.path = label;
        report.push(outcome);
        report
    }

    /// Bumps or sets the version of every target manifest.
    ///
    /// # Errors
    ///
    /// Any invalid version or downgrade aborts before a manifest is written.
    pub fn version(
        &mut self,
        manifests: &[PathBuf],
        change: &VersionChange,
        dry_run: bool,
    ) -> Result<VersionPlan> {
        self.enter(Stage::Version)?;
        let engine = VersionEngine::new(dry_run, Arc::clone(&self.reporter));
        let plan = engine.plan(manifests, change)?;
        engine.execute(&plan)?;
        Ok(plan)
    }

    /// Stages and commits every change in `cwd`.
    pub fn commit(&mut self, cwd: &Path, message: &str) -> Result<StageReport> {
        self.enter(Stage::Commit)?;
        let vcs = &self.tools.vcs;
        let result = vcs
            .add_all(cwd)
            .and_then(|code| if code == 0 { vcs.commit(cwd, message) } else { Ok(code) });
        let report = vcs_outcome(StageReport::new(), cwd, result);
        Ok(self.close(Stage::Commit, report))
    }

    pub fn push(&mut self, cwd: &Path, remote: &str, branch: Option<&str>) -> Result<StageReport> {
        self.enter(Stage::Commit)?;
        let result = self.tools.vcs.push(cwd, remote, branch);
        let report = vcs_outcome(StageReport::new(), cwd, result);
        Ok(self.close(Stage::Commit, report))
    }

    /// Creates a tag and pushes all tags to `remote`.
    pub fn tag(
        &mut self,
        cwd: &Path,
        name: &str,
        message: Option<&str>,
        remote: &str,
    ) -> Result<StageReport> {
        self.enter(Stage::Tag)?;
        let vcs = &self.tools.vcs;
        let result = vcs
            .tag(cwd, name, message)
            .and_then(|code| if code == 0 { vcs.push_tags(cwd, remote) } else { Ok(code) });
        let report = vcs_outcome(StageReport::new(), cwd, result);
        Ok(self.close(Stage::Tag, report))
    }
}

fn vcs_outcome(mut report: StageReport, cwd: &Path, result: Result<i32>) -> StageReport {
    let outcome = match result {
        Ok(0) => ItemOutcome::succeeded(cwd),
        Ok(code) => ItemOutcome {
            exit_code: Some(code),
            ..ItemOutcome::failed(cwd, format!("exited with code {}", code))
        },
        Err(e) => ItemOutcome::failed(cwd, e.to_string()),
    };
    report.push(outcome);
    report
}

fn parent_dir(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn manifest_dirs(manifests: &[PathBuf]) -> Vec<PathBuf> {
    manifests.iter().map(|m| parent_dir(m)).collect()
}
