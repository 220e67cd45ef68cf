//! Terminal implementation of the pipeline reporter.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use owo_colors::OwoColorize;

use relkit_core::analyze::Analysis;
use relkit_core::outcome::{ItemOutcome, StageReport};
use relkit_core::pipeline::Stage;
use relkit_core::release::VersionUpdate;
use relkit_core::reporter::PipelineReporter;

use crate::formatting::{
    format_duration, print_analysis_tables, print_error, print_outcome_table, print_section_header,
    print_success, print_warning, Status,
};

/// Output lines kept from a failed command.
const FAILURE_TAIL_LINES: usize = 20;

pub struct CliReporter {
    started: Mutex<Option<Instant>>,
    /// Output already went to the terminal while the command ran.
    streaming: bool,
}

impl CliReporter {
    pub fn new(streaming: bool) -> Self {
        Self {
            started: Mutex::new(None),
            streaming,
        }
    }

    fn elapsed(&self) -> Option<String> {
        let started = self.started.lock().ok()?.take()?;
        Some(format_duration(started.elapsed().as_secs_f64()))
    }
}

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::Lock => "Locking",
        Stage::Install => "Installing",
        Stage::Build => "Building",
        Stage::Test => "Testing",
        Stage::Analyze => "Analyzing test results",
        Stage::RemoteUpdate => "Updating remote dependencies",
        Stage::Publish => "Publishing",
        Stage::Version => "Updating versions",
        Stage::Lint => "Linting",
        Stage::Format => "Formatting",
        Stage::Commit => "Committing",
        Stage::Tag => "Tagging",
    }
}

impl PipelineReporter for CliReporter {
    fn stage_started(&self, stage: Stage) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        print_section_header(stage_title(stage));
    }

    fn item_started(&self, _stage: Stage, index: usize, total: usize, path: &Path) {
        println!(
            "  {} {}",
            format!("({}/{})", index, total).bright_black(),
            path.display().bold()
        );
    }

    fn item_finished(&self, _stage: Stage, outcome: &ItemOutcome) {
        if outcome.success {
            return;
        }
        print_error(outcome.error.as_deref().unwrap_or("failed"));
        if self.streaming {
            return;
        }
        if let Some(output) = &outcome.output {
            let lines: Vec<&str> = output.lines().collect();
            let skip = lines.len().saturating_sub(FAILURE_TAIL_LINES);
            for line in &lines[skip..] {
                println!("    {}", line.bright_black());
            }
        }
    }

    fn stage_finished(&self, stage: Stage, report: &StageReport) {
        if report.len() > 1 {
            println!();
            print_outcome_table(report);
        }

        let elapsed = self
            .elapsed()
            .map(|e| format!(" in {}", e))
            .unwrap_or_default();
        let failed = report.failed().count();
        if report.success {
            print_success(&format!("{} completed{}", stage, elapsed));
        } else {
            print_error(&format!(
                "{}: {} of {} item(s) failed{}",
                stage,
                failed,
                report.len(),
                elapsed
            ));
        }
    }

    fn version_changed(&self, update: &VersionUpdate, dry_run: bool) {
        let prefix = if dry_run {
            "[DRY RUN] ".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}{} {} {} {}",
            Status::Info.colored_symbol(),
            prefix,
            update.name.bold(),
            update.old_version.bright_black(),
            "→".cyan(),
            update.new_version.green().bold()
        );
    }

    fn analysis(&self, analysis: &Analysis) {
        print_analysis_tables(analysis);
        for failure in &analysis.threshold_failures {
            print_error(&format!(
                "{} tests did not meet {} (actual {:.2}%)",
                failure.metric, failure.threshold, failure.actual
            ));
        }
    }

    fn warning(&self, _stage: Stage, message: &str) {
        print_warning(message);
    }
}
