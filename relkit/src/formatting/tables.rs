//! Tables built with comfy-table.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use relkit_core::analyze::Analysis;
use relkit_core::manifest::{Dependency, DependencySource};
use relkit_core::outcome::StageReport;
use relkit_core::release::VersionUpdate;

use super::Status;

fn table_with_header(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// One row per item of a stage, failures in red.
pub fn print_outcome_table(report: &StageReport) {
    let mut table = table_with_header(&["Status", "Location", "Details"]);

    for outcome in &report.details {
        if outcome.success {
            table.add_row(vec![
                Cell::new(Status::Success.symbol()).fg(Color::Green),
                Cell::new(outcome.path.display()).fg(Color::White),
                Cell::new(""),
            ]);
        } else {
            let details = outcome.error.clone().unwrap_or_else(|| "failed".to_string());
            table.add_row(vec![
                Cell::new(Status::Error.symbol()).fg(Color::Red),
                Cell::new(outcome.path.display()).fg(Color::Red),
                Cell::new(details).fg(Color::Red),
            ]);
        }
    }

    println!("{}", table);
}

pub fn print_version_table(updates: &[VersionUpdate], dry_run: bool) {
    let mut table = table_with_header(&["Package", "Current", "New", "Manifest"]);
    let new_color = if dry_run { Color::Yellow } else { Color::Green };

    for update in updates {
        table.add_row(vec![
            Cell::new(&update.name).fg(Color::White),
            Cell::new(&update.old_version).fg(Color::DarkGrey),
            Cell::new(&update.new_version).fg(new_color),
            Cell::new(update.file.display()).fg(Color::DarkGrey),
        ]);
    }

    println!("{}", table);
}

/// Lists dependencies with where each one is sourced from.
pub fn print_dependency_table(dependencies: &[Dependency]) {
    let mut table = table_with_header(&["Dependency", "Source", "Location"]);

    for dep in dependencies {
        let (source, location) = match &dep.source {
            DependencySource::Registry(constraint) => ("registry", constraint.clone()),
            DependencySource::Path(path) => ("path", path.display().to_string()),
            DependencySource::Git(git) => {
                let mut location = format!("{}@{}", git.url, git.branch);
                if !git.subdirectory.is_empty() {
                    location.push_str(&format!(" ({})", git.subdirectory));
                }
                ("git", location)
            }
            DependencySource::Conflicting => ("conflicting", String::new()),
        };
        table.add_row(vec![
            Cell::new(&dep.name).fg(Color::White),
            Cell::new(source).fg(Color::Cyan),
            Cell::new(location).fg(Color::DarkGrey),
        ]);
    }

    println!("{}", table);
}

/// Outcome summary followed by the per-tag breakdown.
pub fn print_analysis_tables(analysis: &Analysis) {
    let mut summary = table_with_header(&["Category", "Count", "Total", "Percent"]);
    for row in &analysis.summary {
        let color = match row.category {
            "passed" => Color::Green,
            "skipped" => Color::Yellow,
            _ => Color::Red,
        };
        summary.add_row(vec![
            Cell::new(row.category).fg(color),
            Cell::new(row.count),
            Cell::new(row.total),
            Cell::new(format!("{:.2}%", row.percent)),
        ]);
    }
    println!("{}", summary);

    if analysis.tags.is_empty() {
        return;
    }

    let mut tags = table_with_header(&["Tag", "Total", "Passed", "Skipped", "Failed"]);
    for stats in &analysis.tags {
        tags.add_row(vec![
            Cell::new(&stats.tag).fg(Color::White),
            Cell::new(stats.total),
            Cell::new(format!("{} ({:.1}%)", stats.passed, stats.passed_percent())).fg(Color::Green),
            Cell::new(format!("{} ({:.1}%)", stats.skipped, stats.skipped_percent()))
                .fg(Color::Yellow),
            Cell::new(format!("{} ({:.1}%)", stats.failed, stats.failed_percent())).fg(Color::Red),
        ]);
    }
    println!("{}", tags);
}
