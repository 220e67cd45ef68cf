use std::fs;
use std::path::PathBuf;

use relkit_core::analyze::{analyze_file, evaluate_threshold};
use relkit_core::error::Error;
use tempfile::TempDir;

fn write_report(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("report.json");
    fs::write(&path, content).unwrap();
    path
}

const REPORT: &str = r#"{
  "summary": {"total": 8, "passed": 6, "failed": 1, "skipped": 1},
  "tests": [
    {"outcome": "passed", "keywords": ["tests", "api"]},
    {"outcome": "passed", "keywords": ["api"]},
    {"outcome": "failed", "keywords": ["api", "db"]},
    {"outcome": "passed", "keywords": ["db"]},
    {"outcome": "skipped", "keywords": ["slow"]},
    {"outcome": "passed", "keywords": ["core"]},
    {"outcome": "passed", "keywords": ["core", ""]},
    {"outcome": "PASSED", "keywords": ["core"]}
  ]
}"#;

#[test]
fn test_evaluate_threshold_operators() {
    assert!(evaluate_threshold(80.0, "gt:75").unwrap());
    assert!(!evaluate_threshold(75.0, "gt:75").unwrap());
    assert!(evaluate_threshold(75.0, "ge:75").unwrap());
    assert!(evaluate_threshold(10.0, "lt:10.5").unwrap());
    assert!(evaluate_threshold(60.0, "le:60").unwrap());
    assert!(!evaluate_threshold(60.1, "le:60").unwrap());
    assert!(evaluate_threshold(100.0, "eq:100").unwrap());
}

#[test]
fn test_malformed_thresholds() {
    for threshold in ["greater_than:75", "ge75", "ge:abc", "ge:inf", ":75"] {
        let err = evaluate_threshold(50.0, threshold).unwrap_err();
        assert!(
            matches!(err, Error::InvalidThreshold { .. }),
            "{}",
            threshold
        );
    }
}

#[test]
fn test_summary_percentages() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_report(&temp_dir, REPORT);

    let analysis = analyze_file(&path, Some("ge:75"), Some("le:12.5")).unwrap();

    assert!(analysis.success);
    assert_eq!(analysis.passed_percent, 75.0);
    assert_eq!(analysis.skipped_percent, 12.5);
    assert_eq!(analysis.failed, 1);
    assert_eq!(analysis.source.as_deref(), Some(path.as_path()));
    let categories: Vec<&str> = analysis.summary.iter().map(|row| row.category).collect();
    assert_eq!(categories, vec!["passed", "skipped", "failed"]);
}

#[test]
fn test_unmet_thresholds_are_listed() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_report(&temp_dir, REPORT);

    let analysis = analyze_file(&path, Some("gt:75"), Some("lt:10")).unwrap();

    assert!(!analysis.success);
    let metrics: Vec<&str> = analysis.threshold_failures.iter().map(|f| f.metric).collect();
    assert_eq!(metrics, vec!["passed", "skipped"]);
}

#[test]
fn test_failed_tests_alone_do_not_fail() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_report(&temp_dir, REPORT);

    let analysis = analyze_file(&path, None, None).unwrap();
    assert!(analysis.success);
    assert!(analysis.threshold_failures.is_empty());
}

#[test]
fn test_tags_ordered_by_pass_rate() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_report(&temp_dir, REPORT);

    let analysis = analyze_file(&path, None, None).unwrap();
    let tags: Vec<(&str, u64)> = analysis
        .tags
        .iter()
        .map(|t| (t.tag.as_str(), t.total))
        .collect();

    assert_eq!(tags, vec![("core", 3), ("api", 3), ("db", 2), ("slow", 1)]);
    assert!(analysis.tags.iter().all(|t| t.tag != "tests"));

    let api = &analysis.tags[1];
    assert_eq!((api.passed, api.failed), (2, 1));
    assert_eq!(analysis.tags[2].passed_percent(), 50.0);
    assert_eq!(analysis.tags[3].skipped_percent(), 100.0);
}

#[test]
fn test_invalid_reports() {
    let temp_dir = TempDir::new().unwrap();

    for content in [
        r#"{"tests": [{"outcome": "passed"}]}"#,
        r#"{"summary": {"total": 1, "passed": 1}, "tests": []}"#,
        r#"{"summary": {"total": 0}, "tests": [{"outcome": "passed"}]}"#,
        "not json",
    ] {
        let path = write_report(&temp_dir, content);
        let err = analyze_file(&path, None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidReport { .. }), "{}", content);
    }

    let err = analyze_file(&temp_dir.path().join("missing.json"), None, None).unwrap_err();
    assert!(matches!(err, Error::InvalidReport { .. }));
}

#[test]
fn test_threshold_checked_before_report() {
    let temp_dir = TempDir::new().unwrap();
    let err = analyze_file(&temp_dir.path().join("missing.json"), Some("over:1"), None).unwrap_err();
    assert!(matches!(err, Error::InvalidThreshold { .. }));
}
