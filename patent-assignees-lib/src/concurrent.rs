//! Bounded dispatch of fetch workers.
//!
//! Each identifier becomes one spawned task. Tasks are created lazily from a
//! `buffer_unordered` stream, so at most `concurrency` of them exist at any
//! time, and the dispatcher returns only after every task has finished.

use crate::error::FetchError;
use crate::types::AbandonedIdentifier;
use crate::worker::FetchWorker;
use futures::stream::{self, StreamExt};
use std::io::Write;

/// Owns the worker pool size and drains one run.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    concurrency: usize,
}

impl Dispatcher {
    /// Create a dispatcher running up to `concurrency` workers at once.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every identifier through `worker` and wait for all of them.
    ///
    /// Returns the identifiers that ended without output. A task that dies
    /// without reporting (panic or cancellation) is logged and listed too,
    /// so the report always accounts for every dispatched identifier.
    pub async fn run<W: Write + Send + 'static>(
        &self,
        identifiers: Vec<String>,
        worker: FetchWorker<W>,
    ) -> Vec<AbandonedIdentifier> {
        let tasks = identifiers.into_iter().map(|identifier| {
            let worker = worker.clone();
            async move {
                let task_identifier = identifier.clone();
                let handle = tokio::spawn(async move { worker.process(&task_identifier).await });
                (identifier, handle.await)
            }
        });

        let mut completions = stream::iter(tasks).buffer_unordered(self.concurrency);
        let mut abandoned = Vec::new();

        while let Some((identifier, joined)) = completions.next().await {
            match joined {
                Ok(Ok(_rows)) => {}
                Ok(Err(e)) => abandoned.push(AbandonedIdentifier::from_error(&identifier, &e)),
                Err(join_error) => {
                    tracing::error!(
                        patent_id = %identifier,
                        error = %join_error,
                        "worker task did not complete"
                    );
                    let e = FetchError::internal(format!("worker task failed: {}", join_error));
                    worker.report_abandoned(&identifier, &e);
                    abandoned.push(AbandonedIdentifier::from_error(&identifier, &e));
                }
            }
        }

        abandoned
    }
}
