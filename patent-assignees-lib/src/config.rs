//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and the
//! `PA_*` environment variables, and layering both onto a [`FetchConfig`].

use crate::error::FetchError;
use crate::types::FetchConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Fetch pipeline tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchSection>,

    /// Output sink preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,
}

/// The `[fetch]` table. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FetchSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_budget: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replenish_budget: Option<i64>,

    /// Duration string, e.g. "10s"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_wait: Option<String>,

    /// Duration string, e.g. "1s" or "500ms"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_throttle_retries: Option<u32>,

    /// Duration string, e.g. "30s"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_every: Option<u64>,
}

/// The `[output]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// Append to the output file instead of truncating it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
}

impl FileConfig {
    /// Whether the file asks for append mode.
    pub fn append(&self) -> Option<bool> {
        self.output.as_ref().and_then(|o| o.append)
    }

    /// Layer the `[fetch]` values over `base`.
    pub fn apply_to(&self, mut base: FetchConfig) -> Result<FetchConfig, FetchError> {
        let Some(fetch) = &self.fetch else {
            return Ok(base);
        };

        if let Some(concurrency) = fetch.concurrency {
            base = base.with_concurrency(concurrency);
        }
        if let Some(budget) = fetch.initial_budget {
            base = base.with_initial_budget(budget);
        }
        if let Some(budget) = fetch.replenish_budget {
            base = base.with_replenish_budget(budget);
        }
        if let Some(wait) = &fetch.throttle_wait {
            base = base.with_throttle_wait(require_duration("throttle_wait", wait)?);
        }
        if let Some(interval) = &fetch.poll_interval {
            base = base.with_poll_interval(require_duration("poll_interval", interval)?);
        }
        if let Some(cap) = fetch.max_throttle_retries {
            base = base.with_max_throttle_retries(Some(cap));
        }
        if let Some(timeout) = &fetch.request_timeout {
            base = base.with_request_timeout(require_duration("request_timeout", timeout)?);
        }
        if let Some(endpoint) = &fetch.endpoint {
            base = base.with_endpoint(endpoint.clone());
        }
        if let Some(every) = fetch.milestone_every {
            base = base.with_milestone_every(every);
        }

        Ok(base)
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to log which files were loaded
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// The file must exist and parse; its values are validated before
    /// being returned.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, FetchError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FetchError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            FetchError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            FetchError::config(format!(
                "Failed to parse TOML configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config, then the home directory file, then the working directory
    /// file; later files override earlier ones key by key. A discovered
    /// file that fails to load is an error rather than being skipped.
    pub fn discover_and_load(&self) -> Result<FileConfig, FetchError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            let config = self.load_file(&path)?;
            merged_config = self.merge_configs(merged_config, config);
            loaded_files.push(path);
        }

        if self.verbose {
            for path in &loaded_files {
                tracing::info!(path = %path.display(), "loaded configuration file");
            }
        }

        Ok(merged_config)
    }

    /// Look for a configuration file in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./patent-assignees.toml", "./.patent-assignees.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Look for a configuration file in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let path = Path::new(&home).join(".patent-assignees.toml");
        path.exists().then_some(path)
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("patent-assignees").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations; values from `higher` win.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            fetch: match (lower.fetch, higher.fetch) {
                (Some(lower_fetch), Some(higher_fetch)) => Some(FetchSection {
                    concurrency: higher_fetch.concurrency.or(lower_fetch.concurrency),
                    initial_budget: higher_fetch.initial_budget.or(lower_fetch.initial_budget),
                    replenish_budget: higher_fetch
                        .replenish_budget
                        .or(lower_fetch.replenish_budget),
                    throttle_wait: higher_fetch.throttle_wait.or(lower_fetch.throttle_wait),
                    poll_interval: higher_fetch.poll_interval.or(lower_fetch.poll_interval),
                    max_throttle_retries: higher_fetch
                        .max_throttle_retries
                        .or(lower_fetch.max_throttle_retries),
                    request_timeout: higher_fetch.request_timeout.or(lower_fetch.request_timeout),
                    endpoint: higher_fetch.endpoint.or(lower_fetch.endpoint),
                    milestone_every: higher_fetch.milestone_every.or(lower_fetch.milestone_every),
                }),
                (lower_fetch, higher_fetch) => higher_fetch.or(lower_fetch),
            },
            output: match (lower.output, higher.output) {
                (Some(lower_output), Some(higher_output)) => Some(OutputSection {
                    append: higher_output.append.or(lower_output.append),
                }),
                (lower_output, higher_output) => higher_output.or(lower_output),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), FetchError> {
        let Some(fetch) = &config.fetch else {
            return Ok(());
        };

        if let Some(concurrency) = fetch.concurrency {
            if concurrency == 0 || concurrency > 100 {
                return Err(FetchError::config("Concurrency must be between 1 and 100"));
            }
        }
        if matches!(fetch.initial_budget, Some(b) if b < 0) {
            return Err(FetchError::config("initial_budget cannot be negative"));
        }
        if matches!(fetch.replenish_budget, Some(b) if b <= 0) {
            return Err(FetchError::config("replenish_budget must be positive"));
        }
        if fetch.milestone_every == Some(0) {
            return Err(FetchError::config("milestone_every must be positive"));
        }

        for (key, value) in [
            ("throttle_wait", &fetch.throttle_wait),
            ("poll_interval", &fetch.poll_interval),
            ("request_timeout", &fetch.request_timeout),
        ] {
            if let Some(value) = value {
                require_duration(key, value)?;
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// Holds whatever valid `PA_*` variables were set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub initial_budget: Option<i64>,
    pub replenish_budget: Option<i64>,
    pub throttle_wait: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub max_throttle_retries: Option<u32>,
    pub endpoint: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Layer the environment values over `base`.
    pub fn apply_to(&self, mut base: FetchConfig) -> FetchConfig {
        if let Some(concurrency) = self.concurrency {
            base = base.with_concurrency(concurrency);
        }
        if let Some(budget) = self.initial_budget {
            base = base.with_initial_budget(budget);
        }
        if let Some(budget) = self.replenish_budget {
            base = base.with_replenish_budget(budget);
        }
        if let Some(wait) = self.throttle_wait {
            base = base.with_throttle_wait(wait);
        }
        if let Some(interval) = self.poll_interval {
            base = base.with_poll_interval(interval);
        }
        if let Some(cap) = self.max_throttle_retries {
            base = base.with_max_throttle_retries(Some(cap));
        }
        if let Some(endpoint) = &self.endpoint {
            base = base.with_endpoint(endpoint.clone());
        }
        base
    }
}

/// Load configuration from the process environment.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    EnvConfig {
        concurrency: env_value(&lookup, "PA_CONCURRENCY", "1-100", |v| {
            v.parse::<usize>().ok().filter(|c| (1..=100).contains(c))
        }),
        initial_budget: env_value(&lookup, "PA_INITIAL_BUDGET", "a non-negative integer", |v| {
            v.parse::<i64>().ok().filter(|b| *b >= 0)
        }),
        replenish_budget: env_value(&lookup, "PA_REPLENISH_BUDGET", "a positive integer", |v| {
            v.parse::<i64>().ok().filter(|b| *b > 0)
        }),
        throttle_wait: env_value(&lookup, "PA_THROTTLE_WAIT", "a duration like '10s'", |v| {
            parse_duration_string(v)
        }),
        poll_interval: env_value(&lookup, "PA_POLL_INTERVAL", "a duration like '1s'", |v| {
            parse_duration_string(v).filter(|d| !d.is_zero())
        }),
        max_throttle_retries: env_value(
            &lookup,
            "PA_MAX_THROTTLE_RETRIES",
            "a non-negative integer",
            |v| v.parse::<u32>().ok(),
        ),
        endpoint: env_value(&lookup, "PA_ENDPOINT", "an http(s) URL", |v| {
            (v.starts_with("http://") || v.starts_with("https://")).then(|| v.to_string())
        }),
        input: env_path(&lookup, "PA_INPUT"),
        output: env_path(&lookup, "PA_OUTPUT"),
        config: env_path(&lookup, "PA_CONFIG"),
    }
}

fn env_value<F, T, P>(lookup: &F, key: &str, expected: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::fmt::Debug,
    P: FnOnce(&str) -> Option<T>,
{
    let raw = lookup(key)?;
    match parse(raw.trim()) {
        Some(value) => {
            tracing::debug!(key, ?value, "using environment override");
            Some(value)
        }
        None => {
            tracing::warn!(key, value = %raw, "ignoring invalid environment value, expected {}", expected);
            None
        }
    }
}

fn env_path<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_duration(key: &str, value: &str) -> Result<Duration, FetchError> {
    parse_duration_string(value).ok_or_else(|| {
        FetchError::config(format!(
            "Invalid {} '{}'. Use format like '500ms', '10s', '2m'",
            key, value
        ))
    })
}

/// Parse a duration string like "500ms", "10s", "2m".
///
/// A bare number is taken as seconds.
pub fn parse_duration_string(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    if let Some(ms) = duration_str.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = duration_str.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = duration_str.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        duration_str.parse::<u64>().ok().map(Duration::from_secs)
    }
}
