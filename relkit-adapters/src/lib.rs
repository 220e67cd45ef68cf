//! Concrete tools behind the relkit-core seams.

pub mod git;
pub mod poetry;
pub mod ruff;

pub use git::GitCli;
pub use poetry::PoetryTool;
pub use ruff::RuffTool;

use std::sync::Arc;

use relkit_core::command_validator::CommandValidator;
use relkit_core::config::Settings;
use relkit_core::error::Result;
use relkit_core::pipeline::Toolchain;
use relkit_core::remote::HttpFetcher;
use relkit_core::runner::{CommandRunner, LineSink, ProcessRunner};

/// Assembles the default toolchain from settings.
///
/// When `sink` is given and `stream_output` is enabled, command output is
/// forwarded line by line while commands run.
pub fn toolchain(settings: &Settings, sink: Option<LineSink>) -> Result<Toolchain> {
    let validator = CommandValidator::with_secret_prefixes(settings.secret_prefixes.clone());
    let mut runner = ProcessRunner::new(validator);
    if settings.stream_output {
        if let Some(sink) = sink {
            runner = runner.with_streaming(sink);
        }
    }
    let runner: Arc<dyn CommandRunner> = Arc::new(runner);

    Ok(Toolchain {
        package_tool: Arc::new(PoetryTool::new(settings.package_tool.clone())),
        lint_tool: Arc::new(RuffTool::new(settings.lint_tool.clone())),
        vcs: Arc::new(GitCli::new(settings.git.clone(), runner.clone())),
        fetcher: Arc::new(HttpFetcher::new(settings.fetch_timeout())?),
        runner,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use relkit_core::error::Result;
    use relkit_core::runner::{CommandOutput, CommandRunner};

    /// Records every invocation and answers with a fixed exit code.
    #[derive(Default)]
    pub struct RecordingRunner {
        exit_code: i32,
        calls: Mutex<Vec<(Vec<String>, PathBuf)>>,
    }

    impl RecordingRunner {
        pub fn failing(exit_code: i32) -> Self {
            Self {
                exit_code,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<(Vec<String>, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((argv.to_vec(), cwd.to_path_buf()));
            Ok(CommandOutput {
                exit_code: self.exit_code,
                ..CommandOutput::default()
            })
        }
    }
}
