#![cfg(unix)]

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use relkit_core::runner::{CommandRunner, ProcessRunner};
use relkit_core::streaming::run_streaming;
use tempfile::TempDir;

fn sh(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[test]
fn test_streaming_collects_both_streams() {
    let temp_dir = TempDir::new().unwrap();
    let lines = Mutex::new(Vec::new());

    let output = run_streaming(
        sh("echo out1; echo err1 1>&2; echo out2"),
        "sh",
        temp_dir.path(),
        &|line: &str, is_stderr: bool| lines.lock().unwrap().push((line.to_string(), is_stderr)),
    )
    .unwrap();

    assert!(output.success());
    assert_eq!(output.stdout, "out1\nout2\n");
    assert_eq!(output.stderr, "err1\n");

    let lines = lines.into_inner().unwrap();
    assert_eq!(lines.len(), 3);
    assert!(lines.contains(&("err1".to_string(), true)));
    let stdout_lines: Vec<_> = lines.iter().filter(|(_, e)| !e).map(|(l, _)| l.as_str()).collect();
    assert_eq!(stdout_lines, vec!["out1", "out2"]);
}

#[test]
fn test_streaming_reports_exit_code() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_streaming(sh("exit 3"), "sh", temp_dir.path(), &|_: &str, _: bool| {}).unwrap();
    assert_eq!(output.exit_code, 3);
    assert!(!output.success());
}

#[test]
fn test_streaming_spawn_failure() {
    let result = run_streaming(
        Command::new("relkit-definitely-not-a-program"),
        "missing",
        Path::new("."),
        &|_: &str, _: bool| {},
    );
    assert!(result.is_err());
}

#[test]
fn test_process_runner_streams_to_sink() {
    let temp_dir = TempDir::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let runner = ProcessRunner::default().with_streaming(Arc::new(move |line: &str, _: bool| {
        sink_seen.lock().unwrap().push(line.to_string());
    }));

    let argv = vec!["sh".to_string(), "-c".to_string(), "echo streamed".to_string()];
    let output = runner.run(&argv, temp_dir.path()).unwrap();

    assert_eq!(output.stdout.trim(), "streamed");
    assert_eq!(*seen.lock().unwrap(), vec!["streamed".to_string()]);
}

#[test]
fn test_process_runner_captures_failure() {
    let temp_dir = TempDir::new().unwrap();
    let runner = ProcessRunner::default();
    let argv = vec!["sh".to_string(), "-c".to_string(), "echo oops 1>&2; exit 2".to_string()];
    let output = runner.run(&argv, temp_dir.path()).unwrap();
    assert_eq!(output.exit_code, 2);
    assert_eq!(output.combined(), "oops");
}
