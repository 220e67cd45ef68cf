//! Core library for pyproject monorepo build and release orchestration.

pub mod adapter;
pub mod analyze;
pub mod command_validator;
pub mod config;
pub mod error;
pub mod manifest;
pub mod outcome;
pub mod package;
pub mod phases;
pub mod pipeline;
pub mod release;
pub mod remote;
pub mod reporter;
pub mod runner;
pub mod streaming;
pub mod targets;
pub mod vcs;
pub mod walker;

pub use adapter::{LintTool, PackageTool, PublishCredentials};
pub use analyze::{analyze_file, evaluate_threshold, Analysis, TagStats, Threshold};
pub use command_validator::CommandValidator;
pub use config::Settings;
pub use error::{Error, Result};
pub use manifest::{Dependency, DependencySource, GitDependency, Manifest, PathDependency};
pub use outcome::{ItemOutcome, StageReport};
pub use package::{classify, Classification, PackageKind};
pub use pipeline::{Pipeline, PipelineState, Stage, TestMode, TestRun, Toolchain};
pub use release::{bump, validate_not_lower, BumpKind, DevVersion, VersionChange, VersionEngine};
pub use remote::{HttpFetcher, ManifestFetcher, RemoteVersionResolver};
pub use reporter::{PipelineReporter, SilentReporter};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use targets::{TargetResolver, TargetSpec};
pub use vcs::VersionControl;
pub use walker::{CloneRoot, DependencyWalker, Expansion, Resolution, WorkItem};
