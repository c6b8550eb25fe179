//! Core data types for the assignee fetch pipeline.
//!
//! This module defines the output record, the run configuration and the
//! post-run report.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default query endpoint for assignee lookups.
pub const DEFAULT_ENDPOINT: &str = "https://api.patentsview.org/assignees/query";

/// CSV header written once at the top of every output file.
pub const OUTPUT_HEADER: [&str; 3] = ["patent_id", "assignee_id", "assignee_organization"];

/// One flattened output row.
///
/// `assignee_id` and `assignee_organization` are empty strings when the
/// patent has no assignee data; that is a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssigneeRecord {
    pub patent_id: String,
    pub assignee_id: String,
    pub assignee_organization: String,
}

impl AssigneeRecord {
    pub fn new<P, I, O>(patent_id: P, assignee_id: I, assignee_organization: O) -> Self
    where
        P: Into<String>,
        I: Into<String>,
        O: Into<String>,
    {
        Self {
            patent_id: patent_id.into(),
            assignee_id: assignee_id.into(),
            assignee_organization: assignee_organization.into(),
        }
    }

    /// Placeholder row for a patent with no assignees.
    pub fn empty<P: Into<String>>(patent_id: P) -> Self {
        Self::new(patent_id, "", "")
    }
}

/// Configuration options for a fetch run.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Number of identifiers processed concurrently
    /// Default: 15, Range: 1-100
    pub concurrency: usize,

    /// Permits available when the run starts
    /// Default: 20
    pub initial_budget: i64,

    /// Permits restored after every successful response
    /// Default: 15
    pub replenish_budget: i64,

    /// Pause after a 429 before the identifier is retried
    /// Default: 10 seconds
    pub throttle_wait: Duration,

    /// Wait granularity while the budget is exhausted
    /// Default: 1 second
    pub poll_interval: Duration,

    /// Optional cap on consecutive throttled attempts per identifier.
    /// Default: None (retry until the server stops throttling)
    pub max_throttle_retries: Option<u32>,

    /// Transport-level timeout for one request
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Assignee query endpoint
    pub endpoint: String,

    /// Successful completions between timing diagnostics
    /// Default: 1000
    pub milestone_every: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 15,
            initial_budget: 20,
            replenish_budget: 15,
            throttle_wait: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            max_throttle_retries: None,
            request_timeout: Duration::from_secs(30),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            milestone_every: 1000,
        }
    }
}

impl FetchConfig {
    /// Set the worker count. Capped at 100 to prevent resource exhaustion.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 100);
        self
    }

    pub fn with_initial_budget(mut self, budget: i64) -> Self {
        self.initial_budget = budget;
        self
    }

    pub fn with_replenish_budget(mut self, budget: i64) -> Self {
        self.replenish_budget = budget;
        self
    }

    pub fn with_throttle_wait(mut self, wait: Duration) -> Self {
        self.throttle_wait = wait;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_throttle_retries(mut self, cap: Option<u32>) -> Self {
        self.max_throttle_retries = cap;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_milestone_every(mut self, every: u64) -> Self {
        self.milestone_every = every;
        self
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.concurrency == 0 || self.concurrency > 100 {
            return Err(FetchError::config("Concurrency must be between 1 and 100"));
        }
        if self.initial_budget < 0 {
            return Err(FetchError::config("Initial budget cannot be negative"));
        }
        if self.replenish_budget <= 0 {
            return Err(FetchError::config("Replenish budget must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(FetchError::config("Poll interval must be non-zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(FetchError::config("Request timeout must be non-zero"));
        }
        if self.milestone_every == 0 {
            return Err(FetchError::config("Milestone interval must be non-zero"));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(FetchError::config(format!(
                "Endpoint '{}' must be an http(s) URL",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// How the output file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Create or truncate, then write the header
    #[default]
    Create,

    /// Append to an existing file; the header is written only if it is empty
    Append,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Create => write!(f, "create"),
            OutputMode::Append => write!(f, "append"),
        }
    }
}

/// An identifier that produced no output because of an unrecoverable error.
#[derive(Debug, Clone, Serialize)]
pub struct AbandonedIdentifier {
    pub identifier: String,
    /// Error category (see `FetchError::kind`)
    pub kind: &'static str,
    pub reason: String,
}

impl AbandonedIdentifier {
    pub fn from_error<S: Into<String>>(identifier: S, error: &FetchError) -> Self {
        Self {
            identifier: identifier.into(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Number of identifiers dispatched
    pub total: u64,

    /// Identifiers that completed successfully
    pub processed: u64,

    /// Data rows written (header excluded)
    pub rows_written: u64,

    /// 429 responses observed across all workers
    pub throttle_events: u64,

    /// Identifiers that were dropped, with the reason
    pub abandoned: Vec<AbandonedIdentifier>,

    /// Wall-clock duration of the dispatch phase
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl RunReport {
    /// True when every dispatched identifier completed.
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty() && self.processed == self.total
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
