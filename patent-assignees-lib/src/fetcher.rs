//! Main fetcher implementation.
//!
//! `AssigneeFetcher` wires the shared pieces of one run together: the HTTP
//! client, the rate budget, progress counters, the output writer and the
//! dispatcher.

use crate::client::AssigneeClient;
use crate::concurrent::Dispatcher;
use crate::error::FetchError;
use crate::input::read_identifiers;
use crate::progress::{NoopObserver, ProgressCounters, ProgressObserver};
use crate::rate::RateController;
use crate::types::{AssigneeRecord, FetchConfig, OutputMode, RunReport};
use crate::worker::FetchWorker;
use crate::writer::ResultWriter;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Coordinates assignee fetching for a list of patent identifiers.
///
/// # Example
///
/// ```rust,no_run
/// use patent_assignees_lib::{AssigneeFetcher, FetchConfig, NoopObserver, OutputMode};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = AssigneeFetcher::with_config(FetchConfig::default().with_concurrency(10))?;
///     let report = fetcher
///         .run_files("patent_ids.txt", "mapping.csv", OutputMode::Create, Arc::new(NoopObserver))
///         .await?;
///     println!("{}/{} processed", report.processed, report.total);
///     Ok(())
/// }
/// ```
pub struct AssigneeFetcher {
    config: FetchConfig,
    client: AssigneeClient,
    rate: Arc<RateController>,
}

impl AssigneeFetcher {
    /// Create a fetcher with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FetchConfig::default())
    }

    /// Create a fetcher with custom configuration.
    ///
    /// The configuration is validated before anything is built.
    pub fn with_config(config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;

        let client = AssigneeClient::new(config.endpoint.clone(), config.request_timeout)?;
        let rate = Arc::new(RateController::new(
            config.initial_budget,
            config.replenish_budget,
            config.poll_interval,
        ));

        Ok(Self {
            config,
            client,
            rate,
        })
    }

    /// Get the configuration for this fetcher.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The rate budget shared by every worker this fetcher starts.
    pub fn rate_controller(&self) -> Arc<RateController> {
        self.rate.clone()
    }

    /// Fetch the rows for a single identifier without writing them anywhere.
    ///
    /// Goes through the same budget and throttle handling as a full run.
    pub async fn fetch_assignees(
        &self,
        patent_id: &str,
    ) -> Result<Vec<AssigneeRecord>, FetchError> {
        // `fetch` writes nothing, so the sink stays empty; the counters only
        // collect throttle events for this one call.
        let worker = FetchWorker::new(
            &self.config,
            self.client.clone(),
            self.rate.clone(),
            Arc::new(ProgressCounters::new(1, self.config.milestone_every)),
            Arc::new(ResultWriter::from_writer(std::io::sink(), false)?),
            Arc::new(NoopObserver),
        );

        let parsed = worker.fetch(patent_id).await?;
        Ok(parsed.into_records(patent_id))
    }

    /// Fetch every identifier, writing rows to `writer`.
    ///
    /// Blocks until all identifiers have finished, then flushes the writer.
    /// Per-identifier failures are collected in the report; only a failing
    /// flush makes this return an error.
    pub async fn run<W: Write + Send + 'static>(
        &self,
        identifiers: Vec<String>,
        writer: Arc<ResultWriter<W>>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<RunReport, FetchError> {
        let total = identifiers.len() as u64;
        let counters = Arc::new(ProgressCounters::new(total, self.config.milestone_every));
        let dispatcher = Dispatcher::new(self.config.concurrency);

        tracing::info!(
            total,
            concurrency = dispatcher.concurrency(),
            budget = self.rate.current(),
            "starting assignee fetch"
        );
        observer.on_start(total);

        let start = Instant::now();
        let worker = FetchWorker::new(
            &self.config,
            self.client.clone(),
            self.rate.clone(),
            counters.clone(),
            writer.clone(),
            observer,
        );
        let abandoned = dispatcher.run(identifiers, worker).await;
        let elapsed = start.elapsed();

        writer.flush()?;

        let report = RunReport {
            total,
            processed: counters.processed(),
            rows_written: counters.rows(),
            throttle_events: counters.throttle_events(),
            abandoned,
            elapsed,
        };

        tracing::info!(
            processed = report.processed,
            abandoned = report.abandoned.len(),
            rows = report.rows_written,
            ?elapsed,
            "assignee fetch finished"
        );

        Ok(report)
    }

    /// Read identifiers from `input`, fetch them and write `output`.
    ///
    /// Both files are opened before any request is made; failure to open
    /// either aborts the run.
    pub async fn run_files<I: AsRef<Path>, O: AsRef<Path>>(
        &self,
        input: I,
        output: O,
        mode: OutputMode,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<RunReport, FetchError> {
        let identifiers = read_identifiers(input)?;
        let writer = Arc::new(ResultWriter::create(output, mode)?);

        let report = self.run(identifiers, writer.clone(), observer).await?;
        writer.finish()?;

        Ok(report)
    }
}
