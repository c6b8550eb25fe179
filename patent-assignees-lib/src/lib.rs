//! # Patent Assignees Library
//!
//! Fetches the assignee organizations of a list of patents from a remote
//! query API and flattens them into a CSV mapping file.
//!
//! Requests run with bounded concurrency under a shared, adaptive rate
//! budget: a 429 response drains the budget and parks the worker, and the
//! next successful response refills it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patent_assignees_lib::AssigneeFetcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = AssigneeFetcher::new()?;
//!     for record in fetcher.fetch_assignees("10000000").await? {
//!         println!("{} -> {}", record.patent_id, record.assignee_organization);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Adaptive rate budget**: shared permits drained on 429, restored on success
//! - **Bounded concurrency**: a fixed-size pool of spawned workers
//! - **Serialized CSV output**: rows from concurrent workers never interleave
//! - **Run report**: every identifier that produced no output is listed
//! - **Configurable**: TOML files and `PA_*` environment variables

// Re-export main public API types and functions
pub use client::{query_filter, AssigneeClient, FetchOutcome};
pub use concurrent::Dispatcher;
pub use config::{
    load_env_config, load_env_config_from, parse_duration_string, ConfigManager, EnvConfig,
    FetchSection, FileConfig, OutputSection,
};
pub use error::FetchError;
pub use fetcher::AssigneeFetcher;
pub use input::{parse_identifiers, read_identifiers};
pub use parse::{extract_assignees, parse_response, AssigneeEntry, ParsedAssignees};
pub use progress::{NoopObserver, ProgressCounters, ProgressObserver};
pub use rate::RateController;
pub use types::{
    AbandonedIdentifier, AssigneeRecord, FetchConfig, OutputMode, RunReport, DEFAULT_ENDPOINT,
    OUTPUT_HEADER,
};
pub use worker::FetchWorker;
pub use writer::ResultWriter;

// Internal modules - their public items are re-exported above
mod client;
mod concurrent;
mod config;
mod error;
mod fetcher;
mod input;
mod parse;
mod progress;
mod rate;
mod types;
mod worker;
mod writer;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, FetchError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
