//! Patent Assignees CLI Application
//!
//! Reads patent identifiers from a file, fetches their assignees from the
//! query API and writes a `patent_id,assignee_id,assignee_organization` CSV.
//! This CLI is a thin layer over patent-assignees-lib.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use patent_assignees_lib::{
    load_env_config, parse_duration_string, AssigneeFetcher, ConfigManager, EnvConfig,
    FetchConfig, FileConfig, OutputMode, RunReport,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

const DEFAULT_INPUT: &str = "./patent_ids.txt";
const DEFAULT_OUTPUT: &str = "./patent_id_assignee_mapping.csv";

/// Exit code when `--strict` is set and identifiers were abandoned.
const EXIT_INCOMPLETE: i32 = 2;

/// CLI arguments for patent-assignees
#[derive(Parser, Debug)]
#[command(name = "patent-assignees")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch patent assignees into a CSV mapping file")]
#[command(
    long_about = "Fetch the assignee organizations of a list of patents from the assignee query API.\n\nRequests run concurrently under a shared rate budget that backs off on HTTP 429 and recovers on success."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// File with one patent identifier per line [default: ./patent_ids.txt]
    #[arg(short = 'i', long = "input", value_name = "FILE", help_heading = "Files")]
    pub input: Option<PathBuf>,

    /// CSV file to write [default: ./patent_id_assignee_mapping.csv]
    #[arg(short = 'o', long = "output", value_name = "FILE", help_heading = "Files")]
    pub output: Option<PathBuf>,

    /// Append to the output file instead of truncating it
    #[arg(long = "append", help_heading = "Files")]
    pub append: bool,

    /// Write the run report as JSON to FILE
    #[arg(long = "report", value_name = "FILE", help_heading = "Files")]
    pub report: Option<PathBuf>,

    /// Concurrent workers (default: 15, max: 100)
    #[arg(short = 'c', long = "concurrency", value_name = "N", help_heading = "Rate Limiting")]
    pub concurrency: Option<usize>,

    /// Permits available at start (default: 20)
    #[arg(long = "initial-budget", value_name = "N", help_heading = "Rate Limiting")]
    pub initial_budget: Option<i64>,

    /// Permits restored after each success (default: 15)
    #[arg(long = "replenish-budget", value_name = "N", help_heading = "Rate Limiting")]
    pub replenish_budget: Option<i64>,

    /// Pause after a 429 response, e.g. "10s" (default: 10s)
    #[arg(long = "throttle-wait", value_name = "DUR", value_parser = parse_duration_arg, help_heading = "Rate Limiting")]
    pub throttle_wait: Option<Duration>,

    /// Poll interval while the budget is exhausted (default: 1s)
    #[arg(long = "poll-interval", value_name = "DUR", value_parser = parse_duration_arg, help_heading = "Rate Limiting")]
    pub poll_interval: Option<Duration>,

    /// Abandon an identifier after N throttled retries (default: unlimited)
    #[arg(long = "max-throttle-retries", value_name = "N", help_heading = "Rate Limiting")]
    pub max_throttle_retries: Option<u32>,

    /// Per-request timeout (default: 30s)
    #[arg(long = "request-timeout", value_name = "DUR", value_parser = parse_duration_arg, help_heading = "Network")]
    pub request_timeout: Option<Duration>,

    /// Assignee query endpoint
    #[arg(long = "endpoint", value_name = "URL", help_heading = "Network")]
    pub endpoint: Option<String>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Exit with status 2 if any identifier was abandoned
    #[arg(long = "strict", help_heading = "Configuration")]
    pub strict: bool,

    /// Suppress per-identifier progress lines
    #[arg(short = 'q', long = "quiet", help_heading = "Configuration")]
    pub quiet: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,

    /// Show detailed debug information
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,
}

/// Everything the run needs after all configuration layers are applied.
#[derive(Debug)]
struct RunSettings {
    fetch: FetchConfig,
    input: PathBuf,
    output: PathBuf,
    mode: OutputMode,
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration_string(value)
        .ok_or_else(|| format!("invalid duration '{}', use e.g. '500ms', '10s', '2m'", value))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args);

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the flags.
fn init_logging(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(args.debug)
        .try_init();
}

/// Run the fetch and return the process exit code.
async fn run(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let settings = build_settings(&args, load_env_config())?;
    tracing::debug!(?settings, "resolved settings");

    let fetcher = AssigneeFetcher::with_config(settings.fetch.clone())?;

    if !args.quiet {
        ui::print_header(&settings.input, &settings.output, settings.mode, fetcher.config());
    }

    let observer = Arc::new(ui::ConsoleObserver::new(args.quiet));
    let report = fetcher
        .run_files(&settings.input, &settings.output, settings.mode, observer)
        .await?;

    ui::print_summary(&report, &settings.output);
    ui::print_abandoned(&report);

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    Ok(exit_code(&report, args.strict))
}

fn exit_code(report: &RunReport, strict: bool) -> i32 {
    if strict && !report.abandoned.is_empty() {
        EXIT_INCOMPLETE
    } else {
        0
    }
}

fn write_report(path: &Path, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write report '{}': {}", path.display(), e))?;
    Ok(())
}

/// Resolve settings: defaults, then config files, then `PA_*`, then flags.
fn build_settings(
    args: &Args,
    env_config: EnvConfig,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let file_config = load_file_config(args, &env_config)?;

    let mut fetch = file_config.apply_to(FetchConfig::default())?;
    fetch = env_config.apply_to(fetch);
    fetch = apply_cli_args_to_config(fetch, args);
    fetch.validate()?;

    let input = args
        .input
        .clone()
        .or_else(|| env_config.input.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
    let output = args
        .output
        .clone()
        .or_else(|| env_config.output.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let mode = if args.append || file_config.append().unwrap_or(false) {
        OutputMode::Append
    } else {
        OutputMode::Create
    };

    Ok(RunSettings {
        fetch,
        input,
        output,
        mode,
    })
}

/// Load the explicit config file (`--config` or `PA_CONFIG`) or discover one.
fn load_file_config(
    args: &Args,
    env_config: &EnvConfig,
) -> Result<FileConfig, Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new(args.verbose);

    let explicit = args
        .config
        .as_deref()
        .map(|p| (p, "--config"))
        .or_else(|| env_config.config.as_deref().map(|p| (p, "PA_CONFIG")));

    match explicit {
        Some((path, source)) => {
            tracing::info!(path, source, "using explicit config file");
            config_manager
                .load_file(path)
                .map_err(|e| format!("Failed to load config file '{}': {}", path, e).into())
        }
        None => Ok(config_manager.discover_and_load()?),
    }
}

/// Apply CLI arguments to config (highest precedence).
fn apply_cli_args_to_config(mut config: FetchConfig, args: &Args) -> FetchConfig {
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(budget) = args.initial_budget {
        config = config.with_initial_budget(budget);
    }
    if let Some(budget) = args.replenish_budget {
        config = config.with_replenish_budget(budget);
    }
    if let Some(wait) = args.throttle_wait {
        config = config.with_throttle_wait(wait);
    }
    if let Some(interval) = args.poll_interval {
        config = config.with_poll_interval(interval);
    }
    if let Some(cap) = args.max_throttle_retries {
        config = config.with_max_throttle_retries(Some(cap));
    }
    if let Some(timeout) = args.request_timeout {
        config = config.with_request_timeout(timeout);
    }
    if let Some(endpoint) = &args.endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    config
}
