//! Per-identifier fetch state machine.
//!
//! ```text
//! AwaitingBudget -> Requesting -> Success   (terminal: rows written)
//!                             \-> Throttled -> (wait) -> AwaitingBudget
//!                             \-> Failed    (terminal: identifier abandoned)
//! ```
//!
//! Throttling is retried without limit unless `max_throttle_retries` is set.
//! A worker coming back from its throttle wait re-enters `AwaitingBudget` as
//! a probe: it issues one request even though the budget is still zero.
//! Only a success refills the budget, so without the probe a run in which
//! every in-flight worker was throttled would never resume. A throttled
//! worker that then abandons its identifier refills the budget on the way
//! out so the workers parked behind it get to probe in its place.

use crate::client::{AssigneeClient, FetchOutcome};
use crate::error::FetchError;
use crate::parse::{parse_response, ParsedAssignees};
use crate::progress::{ProgressCounters, ProgressObserver};
use crate::rate::RateController;
use crate::types::FetchConfig;
use crate::writer::ResultWriter;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// State of one identifier inside the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    AwaitingBudget { probe: bool },
    Requesting,
    Throttled,
}

/// Executes the fetch state machine for one identifier at a time.
///
/// Cloning is cheap; every clone shares the same rate budget, counters,
/// writer and observer.
pub struct FetchWorker<W: Write + Send + 'static> {
    client: AssigneeClient,
    rate: Arc<RateController>,
    counters: Arc<ProgressCounters>,
    writer: Arc<ResultWriter<W>>,
    observer: Arc<dyn ProgressObserver>,
    throttle_wait: Duration,
    max_throttle_retries: Option<u32>,
}

impl<W: Write + Send + 'static> Clone for FetchWorker<W> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            rate: self.rate.clone(),
            counters: self.counters.clone(),
            writer: self.writer.clone(),
            observer: self.observer.clone(),
            throttle_wait: self.throttle_wait,
            max_throttle_retries: self.max_throttle_retries,
        }
    }
}

impl<W: Write + Send + 'static> FetchWorker<W> {
    pub fn new(
        config: &FetchConfig,
        client: AssigneeClient,
        rate: Arc<RateController>,
        counters: Arc<ProgressCounters>,
        writer: Arc<ResultWriter<W>>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            client,
            rate,
            counters,
            writer,
            observer,
            throttle_wait: config.throttle_wait,
            max_throttle_retries: config.max_throttle_retries,
        }
    }

    /// Run `identifier` to a terminal state.
    ///
    /// On success the rows are written, `processed` is incremented and the
    /// number of rows is returned. On failure nothing is written and the
    /// error is reported to the observer before being returned.
    pub async fn process(&self, identifier: &str) -> Result<usize, FetchError> {
        match self.complete(identifier).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                tracing::error!(patent_id = identifier, error = %e, "abandoning identifier");
                self.observer.on_abandoned(identifier, &e);
                Err(e)
            }
        }
    }

    /// Report an abandonment that happened outside `process`.
    pub(crate) fn report_abandoned(&self, identifier: &str, error: &FetchError) {
        self.observer.on_abandoned(identifier, error);
    }

    async fn complete(&self, identifier: &str) -> Result<usize, FetchError> {
        let parsed = self.fetch(identifier).await?;
        if parsed.skipped > 0 {
            tracing::debug!(
                patent_id = identifier,
                skipped = parsed.skipped,
                "malformed assignee elements skipped"
            );
        }

        let records = parsed.into_records(identifier);
        self.writer.write_rows(&records)?;

        let processed = self.counters.record_completed(records.len());
        self.observer
            .on_completed(identifier, records.len(), processed, self.counters.total());

        if let Some(elapsed) = self.counters.milestone(processed) {
            tracing::info!(completed = processed, ?elapsed, "completion milestone");
            self.observer.on_milestone(processed, elapsed);
        }

        Ok(records.len())
    }

    /// Retry loop: wait for budget, request, back off on 429.
    ///
    /// Returns the parsed assignees of the first 200 response.
    pub async fn fetch(&self, identifier: &str) -> Result<ParsedAssignees, FetchError> {
        let mut throttled_attempts: u32 = 0;
        let result = self.retry(identifier, &mut throttled_attempts).await;

        if result.is_err() && throttled_attempts > 0 {
            // This worker may be the only one probing a zero budget.
            tracing::debug!(patent_id = identifier, "handing the probe to waiting workers");
            self.rate.restore();
        }
        result
    }

    async fn retry(
        &self,
        identifier: &str,
        throttled_attempts: &mut u32,
    ) -> Result<ParsedAssignees, FetchError> {
        let mut state = FetchState::AwaitingBudget { probe: false };

        loop {
            match state {
                FetchState::AwaitingBudget { probe } => {
                    if !probe {
                        self.rate.block_until_available().await;
                    }
                    state = FetchState::Requesting;
                }
                FetchState::Requesting => match self.client.fetch(identifier).await? {
                    FetchOutcome::Success(body) => {
                        self.rate.restore();
                        return parse_response(identifier, &body);
                    }
                    FetchOutcome::Throttled => state = FetchState::Throttled,
                },
                FetchState::Throttled => {
                    *throttled_attempts += 1;
                    self.rate.deplete();
                    self.counters.record_throttled();
                    self.observer.on_throttled(identifier, *throttled_attempts);

                    if let Some(cap) = self.max_throttle_retries {
                        if *throttled_attempts > cap {
                            return Err(FetchError::throttled(identifier, *throttled_attempts));
                        }
                    }

                    tracing::warn!(
                        patent_id = identifier,
                        attempt = *throttled_attempts,
                        wait = ?self.throttle_wait,
                        "rate limit exceeded, backing off"
                    );
                    sleep(self.throttle_wait).await;
                    state = FetchState::AwaitingBudget { probe: true };
                }
            }
        }
    }
}
