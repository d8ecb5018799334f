//! CLI for labeling one GitHub issue or pull request.
//!
//! Run `ai-labeler --help` for usage information. Every flag also reads the
//! matching GitHub Actions input from the environment.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::Resettable;
use clap::{Arg, ArgAction, CommandFactory, FromArgMatches, Parser};
use labeler::ai::{ProviderRegistry, DEFAULT_MODEL_SPEC};
use labeler::context::{DEFAULT_MAX_CONTEXT_FILE_CHARS, DEFAULT_MAX_DIFF_CHARS};
use labeler::workflow::EXIT_RUN_FAILURE;
use labeler::{
    run_label_workflow, AssemblyLimits, ContextAssembler, DecisionEngine, EventTarget,
    FsContextSource, GitHubClient, LabelerConfig, LlmClassifier, RunOptions, RunReport,
    DEFAULT_CONFIG_PATH,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ai-labeler")]
#[command(about = "Label GitHub issues and pull requests with a language model")]
#[command(version)]
struct Cli {
    /// GitHub token with permission to manage labels
    #[arg(long, env = "INPUT_GITHUB-TOKEN", hide_env_values = true)]
    github_token: String,

    /// Repository in owner/repo format
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: String,

    /// Issue or pull request number (read from the event payload when empty)
    #[arg(long, env = "INPUT_EVENT-NUMBER")]
    number: Option<String>,

    /// Path to the webhook event payload
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: Option<PathBuf>,

    /// Labeler config file, relative to the workspace
    #[arg(long, env = "INPUT_CONFIG-PATH", default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Repository checkout used for config and context files
    #[arg(long, env = "GITHUB_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Model as provider/model (e.g. anthropic/claude-3-5-haiku-latest)
    #[arg(long, env = "INPUT_MODEL", default_value = DEFAULT_MODEL_SPEC)]
    model: String,

    /// Decide and plan, but do not change any labels
    #[arg(long, env = "INPUT_DRY-RUN")]
    dry_run: bool,

    /// Cap on the pull request diff summary, in characters
    #[arg(long, env = "INPUT_MAX-DIFF-CHARS", default_value_t = DEFAULT_MAX_DIFF_CHARS)]
    max_diff_chars: usize,

    /// Cap on each context file, in characters
    #[arg(long, env = "INPUT_MAX-CONTEXT-FILE-CHARS", default_value_t = DEFAULT_MAX_CONTEXT_FILE_CHARS)]
    max_context_file_chars: usize,

    /// Include patch hunks in the diff summary
    #[arg(long, env = "INPUT_INCLUDE-PATCHES", default_value_t = true, action = ArgAction::Set)]
    include_patches: bool,

    /// GitHub API root (GitHub Enterprise)
    #[arg(long, env = "GITHUB_API_URL", default_value = labeler::github::GITHUB_API_URL)]
    api_url: String,

    /// Report format: text, json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Log format: text, json
    #[arg(long, default_value = "text")]
    log_format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    /// Parse arguments, treating empty environment inputs as unset.
    fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()
            .mut_args(ignore_empty_env)
            .try_get_matches_from(args)?;
        Self::from_arg_matches(&matches)
    }
}

/// Actions exports every declared input, so unset ones arrive as empty
/// strings. Dropping the env fallback lets the argument's default apply.
fn ignore_empty_env(arg: Arg) -> Arg {
    let empty = arg
        .get_env()
        .and_then(std::env::var_os)
        .is_some_and(|value| value.is_empty());
    if empty {
        arg.env(Resettable::Reset)
    } else {
        arg
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::try_parse_args(std::env::args_os()).unwrap_or_else(|e| e.exit());
    init_tracing(cli.verbose, cli.log_format);

    match run(&cli).await {
        Ok(report) => {
            if let Err(e) = print_report(&report, cli.format) {
                error!("Failed to print report: {e:#}");
                return ExitCode::from(EXIT_RUN_FAILURE);
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!("Labeling failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_RUN_FAILURE)
        }
    }
}

fn init_tracing(verbose: bool, format: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let (text, json) = match format {
        OutputFormat::Text => (
            Some(fmt::layer().with_target(false).with_writer(std::io::stderr)),
            None,
        ),
        OutputFormat::Json => (None, Some(fmt::layer().json().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(text)
        .with(json)
        .with(filter)
        .init();
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let number = parse_number(cli.number.as_deref())?;
    let target = EventTarget::resolve(&cli.repository, number, cli.event_path.as_deref())
        .context("Failed to resolve which issue or pull request to label")?;

    let config_path = resolve_in_workspace(&cli.workspace, &cli.config_path);
    let config = LabelerConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let model = non_empty(&cli.model).unwrap_or(DEFAULT_MODEL_SPEC);
    let (provider, model) = ProviderRegistry::with_defaults()
        .resolve(model)
        .context("Failed to select model provider")?;
    info!(provider = provider.name(), model = %model, "Using model");

    let github = GitHubClient::new(
        &cli.github_token,
        &target.repository.owner,
        &target.repository.name,
    )?
    .with_base_url(&cli.api_url)?;

    let limits = AssemblyLimits {
        max_diff_chars: cli.max_diff_chars,
        max_context_file_chars: cli.max_context_file_chars,
        include_patches: cli.include_patches,
    };
    let assembler = ContextAssembler::new(FsContextSource::new(&cli.workspace), limits);
    let engine = DecisionEngine::new(LlmClassifier::new(provider, model));

    let options = RunOptions {
        repository: target.repository.to_string(),
        number: target.number,
        dry_run: cli.dry_run,
    };

    let report = run_label_workflow(&config, &options, &github, &github, &assembler, &engine)
        .await
        .with_context(|| format!("Failed to label {}#{}", options.repository, options.number))?;
    Ok(report)
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

/// Actions passes unset inputs as empty strings.
fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn parse_number(value: Option<&str>) -> Result<Option<u64>> {
    value
        .and_then(non_empty)
        .map(|n| {
            n.trim_start_matches('#')
                .parse::<u64>()
                .with_context(|| format!("Invalid issue/PR number '{n}'"))
        })
        .transpose()
}

fn resolve_in_workspace(workspace: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        workspace.join(DEFAULT_CONFIG_PATH)
    } else if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}
