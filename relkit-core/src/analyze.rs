//! Analysis of JSON test reports against pass/skip thresholds.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Keywords that describe test structure rather than a meaningful tag.
pub const IGNORED_TAGS: &[&str] = &["tests"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparison {
    fn holds(self, value: f64, limit: f64) -> bool {
        match self {
            Comparison::Gt => value > limit,
            Comparison::Ge => value >= limit,
            Comparison::Lt => value < limit,
            Comparison::Le => value <= limit,
            Comparison::Eq => value == limit,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Comparison::Gt => "gt",
            Comparison::Ge => "ge",
            Comparison::Lt => "lt",
            Comparison::Le => "le",
            Comparison::Eq => "eq",
        }
    }
}

/// A threshold such as `ge:80`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub comparison: Comparison,
    pub limit: f64,
}

impl Threshold {
    pub fn is_met(&self, value: f64) -> bool {
        self.comparison.holds(value, self.limit)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.comparison.as_str(), self.limit)
    }
}

impl FromStr for Threshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: String| Error::InvalidThreshold {
            threshold: s.to_string(),
            message,
        };

        let (op, limit) = s
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' separator".to_string()))?;
        let limit: f64 = limit
            .trim()
            .parse()
            .map_err(|_| invalid(format!("'{}' is not a number", limit)))?;
        if !limit.is_finite() {
            return Err(invalid(format!("'{}' is not a finite number", limit)));
        }

        let comparison = match op.trim() {
            "gt" => Comparison::Gt,
            "ge" => Comparison::Ge,
            "lt" => Comparison::Lt,
            "le" => Comparison::Le,
            "eq" => Comparison::Eq,
            other => return Err(invalid(format!("unknown operator '{}'", other))),
        };

        Ok(Self { comparison, limit })
    }
}

/// Evaluates `value` against a threshold expression like `gt:75`.
///
/// # Errors
///
/// Returns [`Error::InvalidThreshold`] if the expression is malformed.
pub fn evaluate_threshold(value: f64, threshold: &str) -> Result<bool> {
    Ok(threshold.parse::<Threshold>()?.is_met(value))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestRecord {
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A machine-readable test report with a summary and per-test records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestReport {
    #[serde(default)]
    pub summary: Option<ReportSummary>,
    #[serde(default)]
    pub tests: Vec<TestRecord>,
}

impl TestReport {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::InvalidReport {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::InvalidReport {
            path: path.to_path_buf(),
            message: format!("JSON decode error: {}", e),
        })
    }
}

/// One row of the outcome summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
    pub category: &'static str,
    pub count: u64,
    pub total: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagStats {
    pub tag: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl TagStats {
    fn percent(&self, count: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    pub fn passed_percent(&self) -> f64 {
        self.percent(self.passed)
    }

    pub fn skipped_percent(&self) -> f64 {
        self.percent(self.skipped)
    }

    pub fn failed_percent(&self) -> f64 {
        self.percent(self.failed)
    }
}

/// A threshold that the report did not meet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdFailure {
    pub metric: &'static str,
    pub threshold: Threshold,
    pub actual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub source: Option<PathBuf>,
    pub summary: Vec<CategoryRow>,
    pub passed_percent: f64,
    pub skipped_percent: f64,
    pub failed: u64,
    /// Tag statistics ordered by descending pass rate.
    pub tags: Vec<TagStats>,
    pub threshold_failures: Vec<ThresholdFailure>,
    pub success: bool,
}

/// Analyzes a loaded report.
///
/// Failed tests alone do not fail the analysis; only unmet thresholds do.
///
/// # Errors
///
/// Returns [`Error::InvalidReport`] when the report has no summary, no tests,
/// or a zero total.
pub fn analyze(
    report: &TestReport,
    passed_threshold: Option<&Threshold>,
    skipped_threshold: Option<&Threshold>,
) -> Result<Analysis> {
    let invalid = |message: &str| Error::InvalidReport {
        path: PathBuf::new(),
        message: message.to_string(),
    };

    let summary = report
        .summary
        .as_ref()
        .filter(|_| !report.tests.is_empty())
        .ok_or_else(|| invalid("invalid or empty test results (no 'summary' or 'tests')"))?;
    if summary.total == 0 {
        return Err(invalid("no tests found (total=0)"));
    }

    let total = summary.total;
    let percent = |count: u64| count as f64 / total as f64 * 100.0;
    let rows = vec![
        CategoryRow {
            category: "passed",
            count: summary.passed,
            total,
            percent: percent(summary.passed),
        },
        CategoryRow {
            category: "skipped",
            count: summary.skipped,
            total,
            percent: percent(summary.skipped),
        },
        CategoryRow {
            category: "failed",
            count: summary.failed,
            total,
            percent: percent(summary.failed),
        },
    ];

    let passed_percent = percent(summary.passed);
    let skipped_percent = percent(summary.skipped);

    let mut threshold_failures = Vec::new();
    for (metric, threshold, actual) in [
        ("passed", passed_threshold, passed_percent),
        ("skipped", skipped_threshold, skipped_percent),
    ] {
        if let Some(threshold) = threshold {
            if !threshold.is_met(actual) {
                tracing::error!(
                    "[analyze] {} tests did not meet threshold {} (actual={:.2}%)",
                    metric,
                    threshold,
                    actual
                );
                threshold_failures.push(ThresholdFailure {
                    metric,
                    threshold: *threshold,
                    actual,
                });
            }
        }
    }

    let tags = tag_breakdown(&report.tests);

    if summary.failed > 0 {
        tracing::warn!("[analyze] {} test(s) failed", summary.failed);
    }

    Ok(Analysis {
        source: None,
        summary: rows,
        passed_percent,
        skipped_percent,
        failed: summary.failed,
        tags,
        success: threshold_failures.is_empty(),
        threshold_failures,
    })
}

/// Loads and analyzes the report at `path` with textual thresholds.
///
/// Thresholds are parsed before the report is read, so a malformed threshold
/// is reported even when the report is missing.
pub fn analyze_file(
    path: &Path,
    passed_threshold: Option<&str>,
    skipped_threshold: Option<&str>,
) -> Result<Analysis> {
    let passed = passed_threshold.map(str::parse::<Threshold>).transpose()?;
    let skipped = skipped_threshold.map(str::parse::<Threshold>).transpose()?;

    let report = TestReport::load(path)?;
    let mut analysis = analyze(&report, passed.as_ref(), skipped.as_ref()).map_err(|e| match e {
        Error::InvalidReport { message, .. } => Error::InvalidReport {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;
    analysis.source = Some(path.to_path_buf());
    Ok(analysis)
}

fn tag_breakdown(tests: &[TestRecord]) -> Vec<TagStats> {
    let mut stats: IndexMap<&str, TagStats> = IndexMap::new();

    for test in tests {
        let outcome = test.outcome.to_lowercase();
        for tag in &test.keywords {
            if tag.trim().is_empty() || IGNORED_TAGS.contains(&tag.as_str()) {
                continue;
            }

            let entry = stats.entry(tag.as_str()).or_insert_with(|| TagStats {
                tag: tag.clone(),
                ..TagStats::default()
            });
            entry.total += 1;
            match outcome.as_str() {
                "passed" => entry.passed += 1,
                "failed" => entry.failed += 1,
                "skipped" => entry.skipped += 1,
                _ => {}
            }
        }
    }

    let mut tags: Vec<TagStats> = stats.into_values().collect();
    tags.sort_by(|a, b| b.passed_percent().total_cmp(&a.passed_percent()));
    tags
}
