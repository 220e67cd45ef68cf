//! Line-by-line forwarding of child process output.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use crossbeam::channel::{self, Sender};

use crate::error::{Error, Result};
use crate::runner::CommandOutput;

/// Spawns `command`, calls `on_line` for every stdout/stderr line as it
/// arrives and returns the collected output once the process exits.
pub fn run_streaming(
    mut command: Command,
    masked: &str,
    cwd: &Path,
    on_line: &(dyn Fn(&str, bool) + Send + Sync),
) -> Result<CommandOutput> {
    let spawn_error = |message: String| Error::CommandFailed {
        command: masked.to_string(),
        cwd: cwd.to_path_buf(),
        message,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(format!("Failed to spawn: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_error("Failed to capture stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_error("Failed to capture stderr".to_string()))?;

    let (tx, rx) = channel::unbounded::<(bool, String)>();
    let mut collected_stdout = String::new();
    let mut collected_stderr = String::new();

    std::thread::scope(|scope| {
        let stdout_tx = tx.clone();
        scope.spawn(move || forward_lines(stdout, false, stdout_tx));
        scope.spawn(move || forward_lines(stderr, true, tx));

        for (is_stderr, line) in rx.iter() {
            on_line(&line, is_stderr);
            let target = if is_stderr {
                &mut collected_stderr
            } else {
                &mut collected_stdout
            };
            target.push_str(&line);
            target.push('\n');
        }
    });

    let status = child
        .wait()
        .map_err(|e| spawn_error(format!("Failed to wait for process: {}", e)))?;

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: collected_stdout,
        stderr: collected_stderr,
    })
}

fn forward_lines(reader: impl Read, is_stderr: bool, tx: Sender<(bool, String)>) {
    for line in BufReader::new(reader).lines().map_while(std::io::Result::ok) {
        if tx.send((is_stderr, line)).is_err() {
            break;
        }
    }
}
