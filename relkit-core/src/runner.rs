//! External command execution.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::command_validator::CommandValidator;
use crate::error::{Error, Result};
use crate::streaming;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Runs an argument vector in a working directory.
///
/// A non-zero exit is not an error: it is reported through
/// [`CommandOutput::exit_code`]. `Err` means the command could not be run at all.
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput>;
}

/// Receives each output line as it is produced; the flag is true for stderr.
pub type LineSink = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// [`CommandRunner`] backed by [`std::process::Command`].
pub struct ProcessRunner {
    validator: CommandValidator,
    sink: Option<LineSink>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(CommandValidator::default())
    }
}

impl ProcessRunner {
    pub fn new(validator: CommandValidator) -> Self {
        Self {
            validator,
            sink: None,
        }
    }

    /// Forwards output lines to `sink` while the command runs.
    pub fn with_streaming(mut self, sink: LineSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn validator(&self) -> &CommandValidator {
        &self.validator
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput> {
        self.validator.validate(argv, cwd)?;
        let masked = self.validator.mask(argv);
        tracing::info!("[runner] Running: {} (cwd={})", masked, cwd.display());

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).current_dir(cwd);

        let output = match &self.sink {
            Some(sink) => streaming::run_streaming(command, &masked, cwd, sink.as_ref())?,
            None => {
                let output = command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output()
                    .map_err(|e| Error::CommandFailed {
                        command: masked.clone(),
                        cwd: cwd.to_path_buf(),
                        message: format!("Failed to spawn: {}", e),
                    })?;
                CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
        };

        if output.success() {
            tracing::debug!("[runner] Finished: {}", masked);
        } else {
            tracing::warn!(
                "[runner] {} exited with code {}",
                masked,
                output.exit_code
            );
        }

        Ok(output)
    }
}
