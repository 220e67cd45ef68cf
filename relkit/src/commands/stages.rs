//! Single-stage commands.

use std::path::{Path, PathBuf};

use anyhow::Result;

use relkit_core::adapter::PublishCredentials;
use relkit_core::analyze::analyze_file;
use relkit_core::pipeline::TestMode;
use relkit_core::release::VersionChange;
use relkit_core::targets::TargetSpec;

use crate::formatting::{
    print_analysis_tables, print_error, print_key_value, print_success, print_version_table,
};

use super::{finish, release_clones, Session};

pub fn cmd_lock(session: &Session, targets: &TargetSpec) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let manifests = targets.resolve(pipeline.manifest_name())?;
    let report = pipeline.lock(&manifests)?;
    Ok(finish(pipeline, &report))
}

pub fn cmd_build(session: &Session, targets: &TargetSpec) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let manifests = targets.resolve(pipeline.manifest_name())?;
    let report = pipeline.build(&manifests)?;
    Ok(finish(pipeline, &report))
}

pub fn cmd_test(
    session: &Session,
    targets: &TargetSpec,
    mode: TestMode,
    workers: usize,
    keep_clones: bool,
) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let manifests = targets.resolve(pipeline.manifest_name())?;
    let run = pipeline.test(&manifests, targets.directory.as_deref(), mode, workers)?;
    if let Some(root) = run.clone_root {
        release_clones(root, keep_clones);
    }
    Ok(finish(pipeline, &run.report))
}

pub fn cmd_publish(
    session: &Session,
    targets: &TargetSpec,
    credentials: &PublishCredentials,
) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let manifests = targets.resolve(pipeline.manifest_name())?;
    let report = pipeline.publish(&manifests, credentials)?;
    Ok(finish(pipeline, &report))
}

/// Lints the target directory, or the current one, and optionally formats it.
pub fn cmd_lint(session: &Session, targets: &TargetSpec, fix: bool, format: bool) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let dirs = vec![targets
        .working_directory()
        .unwrap_or_else(|| PathBuf::from("."))];

    let mut report = pipeline.lint(&dirs, fix)?;
    if format {
        report.merge(pipeline.format(&dirs)?);
    }
    Ok(finish(pipeline, &report))
}

pub fn cmd_version(
    session: &Session,
    targets: &TargetSpec,
    change: &VersionChange,
    dry_run: bool,
) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let manifests = targets.resolve(pipeline.manifest_name())?;
    let plan = pipeline.version(&manifests, change, dry_run)?;
    pipeline.finish(true);

    if plan.updates.len() > 1 && !session.quiet {
        println!();
        print_version_table(&plan.updates, dry_run);
    }
    Ok(true)
}

pub fn cmd_remote(session: &Session, targets: &TargetSpec, output: Option<&Path>) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let report = pipeline.remote_update(targets, output)?;
    Ok(finish(pipeline, &report))
}

/// Analyzes a JSON test report without running anything.
pub fn cmd_analyze(
    report: &Path,
    required_passed: Option<&str>,
    required_skipped: Option<&str>,
    json: bool,
) -> Result<bool> {
    let analysis = analyze_file(report, required_passed, required_skipped)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(analysis.success);
    }

    print_analysis_tables(&analysis);
    println!();
    print_key_value("Passed:", &format!("{:.2}%", analysis.passed_percent));
    print_key_value("Skipped:", &format!("{:.2}%", analysis.skipped_percent));
    for failure in &analysis.threshold_failures {
        print_error(&format!(
            "{} tests did not meet {} (actual {:.2}%)",
            failure.metric, failure.threshold, failure.actual
        ));
    }
    if analysis.success {
        print_success("All threshold conditions met");
    }
    Ok(analysis.success)
}
