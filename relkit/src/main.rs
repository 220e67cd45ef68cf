mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use relkit_core::adapter::PublishCredentials;
use relkit_core::phases::{
    InstallOptions, PrepareOptions, ReleaseOptions, TagOptions, ValidateOptions,
};
use relkit_core::pipeline::TestMode;
use relkit_core::release::{BumpKind, VersionChange};
use relkit_core::targets::TargetSpec;

use commands::Session;

#[derive(Parser)]
#[command(name = "relkit", version)]
#[command(about = "Build, test and release orchestration for pyproject monorepos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file to use instead of looking up relkit.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print command output while commands run.
    #[arg(long, global = true, action)]
    stream: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, global = true, action)]
    quiet: bool,
}

#[derive(Args, Clone)]
struct TargetArgs {
    /// Path to a single manifest.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Directory containing one or more manifests.
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Find manifests recursively under the directory.
    #[arg(short = 'R', long, action)]
    recursive: bool,
}

impl From<TargetArgs> for TargetSpec {
    fn from(args: TargetArgs) -> Self {
        TargetSpec {
            file: args.file,
            directory: args.directory,
            recursive: args.recursive,
        }
    }
}

#[derive(Args, Clone)]
#[group(required = false, multiple = false)]
struct VersionArgs {
    /// Version bump to apply.
    #[arg(long, value_enum)]
    bump: Option<BumpArg>,

    /// Explicit version to set, e.g. 2.0.0.dev1.
    #[arg(long = "set-ver")]
    set_ver: Option<String>,
}

impl VersionArgs {
    fn change(&self) -> Option<VersionChange> {
        match (&self.bump, &self.set_ver) {
            (Some(kind), _) => Some(VersionChange::Bump((*kind).into())),
            (None, Some(version)) => Some(VersionChange::Set(version.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Args, Clone)]
struct TestArgs {
    #[arg(long, value_enum, default_value = "single")]
    test_mode: TestModeArg,

    /// Parallel test workers.
    #[arg(long, default_value_t = 1)]
    num_workers: usize,

    /// Leave dependency clones on disk.
    #[arg(long, action)]
    keep_clones: bool,
}

#[derive(Args, Clone)]
struct AnalysisArgs {
    /// JSON test report to analyze after the tests.
    #[arg(long)]
    results_json: Option<PathBuf>,

    /// Required passed percentage, e.g. ge:80.
    #[arg(long)]
    required_passed: Option<String>,

    /// Allowed skipped percentage, e.g. lt:10.
    #[arg(long)]
    required_skipped: Option<String>,
}

#[derive(Args, Clone)]
struct PublishArgs {
    #[arg(long)]
    publish_username: Option<String>,

    #[arg(long, env = "RELKIT_PUBLISH_PASSWORD", hide_env_values = true)]
    publish_password: Option<String>,

    /// Repository name configured in the package tool.
    #[arg(long)]
    repository: Option<String>,
}

impl From<PublishArgs> for PublishCredentials {
    fn from(args: PublishArgs) -> Self {
        PublishCredentials {
            username: args.publish_username,
            password: args.publish_password,
            repository: args.repository,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Bump or set versions, lint, format and commit.
    Prepare {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        version: VersionArgs,
        #[arg(long, action)]
        dry_run: bool,
        #[arg(long, action)]
        no_lint: bool,
        #[arg(long, action)]
        lint_fix: bool,
        /// Continue when lint reports problems.
        #[arg(long, action)]
        lint_no_exit: bool,
        #[arg(long, action)]
        no_format: bool,
        #[arg(long = "commit-msg", default_value = "chore: prepare changes")]
        commit_msg: String,
        #[arg(long, action)]
        push: bool,
        #[arg(long)]
        remote: Option<String>,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Lock and install packages.
    Install {
        #[command(flatten)]
        targets: TargetArgs,
        #[arg(long, action)]
        all_extras: bool,
    },
    /// Run tests and analyze the results.
    Validate {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        test: TestArgs,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Validate, build, update remote dependencies and publish.
    Release {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        test: TestArgs,
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[command(flatten)]
        publish: PublishArgs,
        /// Tag the release and push tags afterwards.
        #[arg(long, action)]
        tag: bool,
        #[arg(long, requires = "tag")]
        tag_name: Option<String>,
        #[arg(long, requires = "tag")]
        tag_message: Option<String>,
        #[arg(long)]
        remote: Option<String>,
    },
    Lock {
        #[command(flatten)]
        targets: TargetArgs,
    },
    Build {
        #[command(flatten)]
        targets: TargetArgs,
    },
    Version {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        version: VersionArgs,
        #[arg(long, action)]
        dry_run: bool,
    },
    /// Rewrite git dependencies into version constraints.
    Remote {
        #[command(flatten)]
        targets: TargetArgs,
        /// Write the result here instead of in place (single manifest only).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Test {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        test: TestArgs,
    },
    /// Analyze a JSON test report against thresholds.
    Analyze {
        report: PathBuf,
        #[arg(long)]
        required_passed: Option<String>,
        #[arg(long)]
        required_skipped: Option<String>,
        #[arg(long, action)]
        json: bool,
    },
    /// Show path and git dependencies, or pin path dependencies.
    Pyproject {
        #[command(flatten)]
        targets: TargetArgs,
        #[arg(long)]
        pin_version: Option<String>,
        #[arg(long, action)]
        json: bool,
    },
    Publish {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        publish: PublishArgs,
    },
    Lint {
        #[command(flatten)]
        targets: TargetArgs,
        #[arg(long, action)]
        fix: bool,
        /// Also run the formatter.
        #[arg(long, action)]
        format: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum BumpArg {
    Major,
    Minor,
    Patch,
    Finalize,
}

impl From<BumpArg> for BumpKind {
    fn from(arg: BumpArg) -> Self {
        match arg {
            BumpArg::Major => BumpKind::Major,
            BumpArg::Minor => BumpKind::Minor,
            BumpArg::Patch => BumpKind::Patch,
            BumpArg::Finalize => BumpKind::Finalize,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum TestModeArg {
    Single,
    Monorepo,
    Each,
}

impl From<TestModeArg> for TestMode {
    fn from(arg: TestModeArg) -> Self {
        match arg {
            TestModeArg::Single => TestMode::Single,
            TestModeArg::Monorepo => TestMode::Monorepo,
            TestModeArg::Each => TestMode::Each,
        }
    }
}

fn validate_options(targets: TargetArgs, test: TestArgs, analysis: AnalysisArgs) -> ValidateOptions {
    ValidateOptions {
        targets: targets.into(),
        mode: test.test_mode.into(),
        workers: test.num_workers,
        report: analysis.results_json,
        required_passed: analysis.required_passed,
        required_skipped: analysis.required_skipped,
        keep_clones: test.keep_clones,
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let log_level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_env("RELKIT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let session = Session::load(cli.config.as_deref(), cli.stream, cli.quiet)?;
    let default_remote = session.settings.remote.clone();

    match cli.command {
        Commands::Prepare {
            targets,
            version,
            dry_run,
            no_lint,
            lint_fix,
            lint_no_exit,
            no_format,
            commit_msg,
            push,
            remote,
            branch,
        } => commands::cmd_prepare(
            &session,
            PrepareOptions {
                targets: targets.into(),
                change: version.change(),
                dry_run,
                lint: !no_lint,
                lint_fix,
                lint_exit_on_error: !lint_no_exit,
                format: !no_format,
                commit_message: commit_msg,
                push,
                remote: remote.unwrap_or(default_remote),
                branch,
            },
        ),
        Commands::Install {
            targets,
            all_extras,
        } => commands::cmd_install(
            &session,
            InstallOptions {
                targets: targets.into(),
                all_extras,
            },
        ),
        Commands::Validate {
            targets,
            test,
            analysis,
        } => commands::cmd_validate(&session, validate_options(targets, test, analysis)),
        Commands::Release {
            targets,
            test,
            analysis,
            publish,
            tag,
            tag_name,
            tag_message,
            remote,
        } => commands::cmd_release(
            &session,
            ReleaseOptions {
                validate: validate_options(targets, test, analysis),
                credentials: publish.into(),
                tag: tag.then_some(TagOptions {
                    name: tag_name,
                    message: tag_message,
                }),
                remote: remote.unwrap_or(default_remote),
            },
        ),
        Commands::Lock { targets } => commands::cmd_lock(&session, &targets.into()),
        Commands::Build { targets } => commands::cmd_build(&session, &targets.into()),
        Commands::Version {
            targets,
            version,
            dry_run,
        } => match version.change() {
            Some(change) => commands::cmd_version(&session, &targets.into(), &change, dry_run),
            None => Err(anyhow::anyhow!("Specify --bump or --set-ver")),
        },
        Commands::Remote { targets, output } => {
            commands::cmd_remote(&session, &targets.into(), output.as_deref())
        }
        Commands::Test { targets, test } => commands::cmd_test(
            &session,
            &targets.into(),
            test.test_mode.into(),
            test.num_workers,
            test.keep_clones,
        ),
        Commands::Pyproject {
            targets,
            pin_version,
            json,
        } => commands::cmd_pyproject(&session, &targets.into(), pin_version.as_deref(), json),
        Commands::Publish { targets, publish } => {
            commands::cmd_publish(&session, &targets.into(), &publish.into())
        }
        Commands::Lint {
            targets,
            fix,
            format,
        } => commands::cmd_lint(&session, &targets.into(), fix, format),
        Commands::Analyze {
            report,
            required_passed,
            required_skipped,
            json,
        } => commands::cmd_analyze(
            &report,
            required_passed.as_deref(),
            required_skipped.as_deref(),
            json,
        ),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", formatting::Status::Error.format(&format!("{:#}", e)));
            std::process::exit(1);
        }
    }
}
