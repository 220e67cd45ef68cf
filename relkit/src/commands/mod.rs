//! Command implementations for the CLI.
//!
//! Every command returns `Ok(true)` on full success and `Ok(false)` when a
//! stage failed; `main` maps the latter to exit code 1.

mod phases;
mod pyproject;
mod reporter;
mod stages;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use relkit_core::config::Settings;
use relkit_core::outcome::StageReport;
use relkit_core::pipeline::Pipeline;
use relkit_core::reporter::{PipelineReporter, SilentReporter};
use relkit_core::runner::LineSink;
use relkit_core::walker::CloneRoot;

pub use phases::{cmd_install, cmd_prepare, cmd_release, cmd_validate};
pub use pyproject::cmd_pyproject;
pub use reporter::CliReporter;
pub use stages::{
    cmd_analyze, cmd_build, cmd_lint, cmd_lock, cmd_publish, cmd_remote, cmd_test, cmd_version,
};

/// Loaded settings plus the display choices made on the command line.
pub struct Session {
    pub settings: Settings,
    pub quiet: bool,
}

impl Session {
    /// Loads settings from `config` or by lookup from the current directory.
    ///
    /// `stream` forces live command output regardless of the settings file.
    pub fn load(config: Option<&Path>, stream: bool, quiet: bool) -> Result<Self> {
        let mut settings = match config {
            Some(path) => Settings::from_file(path)?,
            None => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                Settings::load(&cwd)?
            }
        };
        if stream {
            settings.stream_output = true;
        }
        Ok(Self { settings, quiet })
    }

    pub fn reporter(&self) -> Arc<dyn PipelineReporter> {
        if self.quiet {
            Arc::new(SilentReporter)
        } else {
            Arc::new(CliReporter::new(self.settings.stream_output))
        }
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let sink: LineSink = Arc::new(|line: &str, is_stderr: bool| {
            if is_stderr {
                eprintln!("    {}", line.bright_red());
            } else {
                println!("    {}", line.bright_black());
            }
        });
        let tools = relkit_adapters::toolchain(&self.settings, Some(sink))?;
        Ok(Pipeline::new(tools, &self.settings).with_reporter(self.reporter()))
    }
}

/// Marks the pipeline finished with the report's outcome.
fn finish(mut pipeline: Pipeline, report: &StageReport) -> bool {
    pipeline.finish(report.success);
    report.success
}

fn release_clones(root: CloneRoot, keep: bool) {
    if keep {
        let path = root.keep();
        crate::formatting::print_info(&format!("Kept dependency clones in {}", path.display()));
        return;
    }
    if let Err(e) = root.release() {
        tracing::warn!("[cleanup] Could not remove clone directory: {}", e);
    }
}
