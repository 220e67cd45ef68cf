//! High-level phases chaining pipeline stages.
//!
//! Each phase stops at the first stage that fails, except inside each-mode
//! releases where only the failing work items are dropped. Phases return
//! `Ok(false)` for stage failures and `Err` for discovery, manifest and
//! version errors.

use std::path::{Path, PathBuf};

use crate::adapter::PublishCredentials;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineState, Stage, TestMode, TestRun};
use crate::release::VersionChange;
use crate::targets::TargetSpec;
use crate::walker::CloneRoot;

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub targets: TargetSpec,
    pub all_extras: bool,
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub targets: TargetSpec,
    pub change: Option<VersionChange>,
    pub dry_run: bool,
    pub lint: bool,
    pub lint_fix: bool,
    /// Abort the phase when lint reports problems.
    pub lint_exit_on_error: bool,
    pub format: bool,
    pub commit_message: String,
    pub push: bool,
    pub remote: String,
    pub branch: Option<String>,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            targets: TargetSpec::default(),
            change: None,
            dry_run: false,
            lint: true,
            lint_fix: false,
            lint_exit_on_error: true,
            format: true,
            commit_message: "chore: prepare changes".to_string(),
            push: false,
            remote: "origin".to_string(),
            branch: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub targets: TargetSpec,
    pub mode: TestMode,
    pub workers: usize,
    /// JSON test report to analyze after the tests.
    pub report: Option<PathBuf>,
    pub required_passed: Option<String>,
    pub required_skipped: Option<String>,
    /// Leave dependency clones on disk afterwards.
    pub keep_clones: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            targets: TargetSpec::default(),
            mode: TestMode::Single,
            workers: 1,
            report: None,
            required_passed: None,
            required_skipped: None,
            keep_clones: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    /// Tag name; `v<version>` of the first target when unset.
    pub name: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub validate: ValidateOptions,
    pub credentials: PublishCredentials,
    pub tag: Option<TagOptions>,
    pub remote: String,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            validate: ValidateOptions::default(),
            credentials: PublishCredentials::default(),
            tag: None,
            remote: "origin".to_string(),
        }
    }
}

fn conclude(pipeline: &mut Pipeline, stage: Stage, success: bool) -> bool {
    if success {
        tracing::info!("[{}] Completed successfully", stage);
    }
    pipeline.finish(success) == PipelineState::Done
}

fn abort(pipeline: &mut Pipeline, stage: Stage, message: &str) -> bool {
    tracing::error!("[{}] {}. Exiting.", stage, message);
    pipeline.reporter().warning(stage, message);
    pipeline.finish(false);
    false
}

/// Locks then installs the targets.
pub fn install(pipeline: &mut Pipeline, options: &InstallOptions) -> Result<bool> {
    let manifests = options.targets.resolve(pipeline.manifest_name())?;

    tracing::info!("[install] Locking packages...");
    if !pipeline.lock(&manifests)?.success {
        return Ok(abort(pipeline, Stage::Lock, "Lock failed"));
    }

    tracing::info!("[install] Installing packages...");
    let installed = pipeline.install(&manifests, options.all_extras)?;
    if !installed.success {
        return Ok(abort(pipeline, Stage::Install, "Install failed"));
    }

    Ok(conclude(pipeline, Stage::Install, true))
}

/// Updates versions, lints, formats and commits.
///
/// Format and commit problems are warnings; a lint failure aborts only when
/// `lint_exit_on_error` is set.
pub fn prepare(pipeline: &mut Pipeline, options: &PrepareOptions) -> Result<bool> {
    match &options.change {
        Some(change) => {
            let manifests = options.targets.resolve(pipeline.manifest_name())?;
            pipeline.version(&manifests, change, options.dry_run)?;
        }
        None => tracing::info!("[prepare] No version operation specified; skipping version update"),
    }

    let work_dir = options
        .targets
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let dirs = vec![work_dir.clone()];

    if options.lint {
        let linted = pipeline.lint(&dirs, options.lint_fix)?;
        if !linted.success {
            if options.lint_exit_on_error {
                return Ok(abort(pipeline, Stage::Lint, "Lint reported errors"));
            }
            pipeline
                .reporter()
                .warning(Stage::Lint, "Lint reported errors; continuing");
        }
    } else {
        tracing::info!("[prepare] Lint step disabled");
    }

    if options.format {
        if !pipeline.format(&dirs)?.success {
            pipeline
                .reporter()
                .warning(Stage::Format, "Formatting failed; continuing");
        }
    } else {
        tracing::info!("[prepare] Format step disabled");
    }

    if options.dry_run {
        tracing::info!("[prepare] Dry run; not committing");
        return Ok(conclude(pipeline, Stage::Commit, true));
    }

    if !pipeline.commit(&work_dir, &options.commit_message)?.success {
        pipeline.reporter().warning(
            Stage::Commit,
            "Git commit failed or there were no changes to commit",
        );
    } else if options.push
        && !pipeline
            .push(&work_dir, &options.remote, options.branch.as_deref())?
            .success
    {
        return Ok(abort(pipeline, Stage::Commit, "Push failed"));
    }

    Ok(conclude(pipeline, Stage::Commit, true))
}

/// Runs the tests and, if a report is given, analyzes it.
pub fn validate(pipeline: &mut Pipeline, options: &ValidateOptions) -> Result<bool> {
    let manifests = options.targets.resolve(pipeline.manifest_name())?;
    let (run, analysis_passed) = run_validation(pipeline, options, &manifests)?;
    if let Some(root) = run.clone_root {
        release_clones(root, options.keep_clones);
    }
    let success = run.report.success && analysis_passed;
    Ok(conclude(pipeline, Stage::Test, success))
}

/// Test then optional analysis; the clone root is handed back to the caller
/// together with whether the analysis passed.
fn run_validation(
    pipeline: &mut Pipeline,
    options: &ValidateOptions,
    manifests: &[PathBuf],
) -> Result<(TestRun, bool)> {
    tracing::info!("[validate] Running tests...");
    let mut run = pipeline.test(
        manifests,
        options.targets.directory.as_deref(),
        options.mode,
        options.workers,
    )?;
    if !run.report.success && options.mode != TestMode::Each {
        tracing::error!("[validate] Some tests failed");
        return Ok((run, true));
    }

    match &options.report {
        Some(report) => {
            tracing::info!("[validate] Analyzing test results from {}", report.display());
            let analyzed = pipeline.analyze(
                report,
                options.required_passed.as_deref(),
                options.required_skipped.as_deref(),
            );
            let (analysis, _) = match analyzed {
                Ok(analyzed) => analyzed,
                Err(e) => {
                    if let Some(root) = run.clone_root.take() {
                        release_clones(root, options.keep_clones);
                    }
                    return Err(e);
                }
            };
            if !analysis.success {
                tracing::error!("[validate] Analysis failed");
                return Ok((run, false));
            }
        }
        None => tracing::info!("[validate] No test results JSON provided; skipping analysis"),
    }

    Ok((run, true))
}

/// Validates, builds, rewrites remote dependencies and publishes.
///
/// In each-mode only work items whose tests passed are built and published,
/// and the remote rewrite targets the dependency clones rather than the
/// aggregator. The clone root is released at the end unless clones are kept.
pub fn release(pipeline: &mut Pipeline, options: &ReleaseOptions) -> Result<bool> {
    let manifests = options.validate.targets.resolve(pipeline.manifest_name())?;

    tracing::info!("[release] Running validation...");
    let (mut run, analysis_passed) = run_validation(pipeline, &options.validate, &manifests)?;
    let clone_root = run.clone_root.take();

    let result = if !analysis_passed {
        tracing::error!("[release] Validation failed. Exiting release step.");
        Ok(false)
    } else if options.validate.mode == TestMode::Each {
        release_each(pipeline, options, &run, clone_root.as_ref())
    } else {
        release_combined(pipeline, options, &manifests, &run)
    };

    if let Some(root) = clone_root {
        release_clones(root, options.validate.keep_clones);
    }

    let published = match result {
        Ok(published) => published,
        Err(e) => {
            pipeline.finish(false);
            return Err(e);
        }
    };
    if !published {
        return Ok(abort(pipeline, Stage::Publish, "Release failed"));
    }

    if let Some(tag) = &options.tag {
        if !tag_release(pipeline, &manifests, &options.validate.targets, tag, &options.remote)? {
            return Ok(abort(pipeline, Stage::Tag, "Tagging failed"));
        }
    }

    Ok(conclude(pipeline, Stage::Publish, true))
}

fn release_combined(
    pipeline: &mut Pipeline,
    options: &ReleaseOptions,
    manifests: &[PathBuf],
    run: &TestRun,
) -> Result<bool> {
    if !run.report.success {
        tracing::error!("[release] Validation failed. Exiting release step.");
        return Ok(false);
    }

    tracing::info!("[release] Building packages...");
    if !pipeline.build(manifests)?.success {
        tracing::error!("[release] Build failed");
        return Ok(false);
    }

    tracing::info!("[release] Updating remote git-based dependencies...");
    if !pipeline.remote_update(&options.validate.targets, None)?.success {
        tracing::error!("[release] Remote update failed");
        return Ok(false);
    }

    tracing::info!("[release] Publishing packages...");
    Ok(pipeline.publish(manifests, &options.credentials)?.success)
}

fn release_each(
    pipeline: &mut Pipeline,
    options: &ReleaseOptions,
    run: &TestRun,
    clone_root: Option<&CloneRoot>,
) -> Result<bool> {
    let passed = run.passed_items();
    let failed = run.report.len() - passed.len();
    if failed > 0 {
        let message = format!("{} item(s) failed tests and will not be published", failed);
        tracing::warn!("[release] {}", message);
        pipeline.reporter().warning(Stage::Test, &message);
    }

    if let Some(root) = clone_root.filter(|_| !run.cloned_items.is_empty()) {
        tracing::info!(
            "[release] Updating remote git-based dependencies in {}",
            root.path().display()
        );
        let targets = TargetSpec::directory(root.path(), true);
        if !pipeline.remote_update(&targets, None)?.success {
            tracing::error!("[release] Remote update failed");
            return Ok(false);
        }
    } else if clone_root.is_some() {
        tracing::warn!("[release] No git dependency was materialized; skipping remote update");
    }

    tracing::info!("[release] Publishing {} package(s)...", passed.len());
    let published = pipeline.publish_items(&passed, &options.credentials)?;
    Ok(run.report.success && published.success)
}

fn tag_release(
    pipeline: &mut Pipeline,
    manifests: &[PathBuf],
    targets: &TargetSpec,
    tag: &TagOptions,
    remote: &str,
) -> Result<bool> {
    let name = match &tag.name {
        Some(name) => name.clone(),
        None => {
            let primary = manifests.first().map(PathBuf::as_path).unwrap_or(Path::new("."));
            let manifest = crate::manifest::Manifest::read(primary)?;
            match manifest.version() {
                Some(version) => format!("v{}", version),
                None => {
                    tracing::error!("[tag] {} declares no version to tag", primary.display());
                    return Ok(false);
                }
            }
        }
    };

    let cwd = targets
        .working_directory()
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::info!("[tag] Creating tag {} in {}", name, cwd.display());
    Ok(pipeline
        .tag(&cwd, &name, tag.message.as_deref(), remote)?
        .success)
}

fn release_clones(root: CloneRoot, keep: bool) {
    if keep {
        root.keep();
        return;
    }
    if let Err(e) = root.release() {
        tracing::warn!("[cleanup] Could not remove clone directory: {}", e);
    }
}
