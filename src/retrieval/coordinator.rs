//! Fetch Coordinator - runs a plan against a transport
//!
//! ```text
//! Plan ──▶ group by stream ──▶ bounded pool (workers)
//!                                  │ per stream, under its key lock:
//!                                  ├─ re-check gap against coverage
//!                                  ├─ fetch with retry
//!                                  └─ ArchiveWriter::persist
//!                                  ▼
//!                          RetrievalSummary (one row per interval)
//! ```
//!
//! Failures are recorded per interval and never abort sibling work.

use crate::archive::{ArchiveWriter, Interval, StreamKey};
use crate::index::StreamIndex;
use crate::retrieval::planner::{Plan, StreamPlan};
use crate::retrieval::retry::{retry_with_backoff, RetryPolicy};
use crate::retrieval::transport::Transport;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// What happened to one planned interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Data fetched and committed
    Downloaded { partitions: usize, bytes: u64 },
    /// The remote holds nothing for the interval
    NoData,
    /// Filled by another retrieval before this one got the lock
    AlreadyCovered,
    /// Transport or archive failure after retries
    Failed { error: String },
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Downloaded { partitions, bytes } => {
                write!(f, "downloaded {} partitions {} bytes", partitions, bytes)
            }
            Outcome::NoData => write!(f, "no data"),
            Outcome::AlreadyCovered => write!(f, "already covered"),
            Outcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// One row of the outcome table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalOutcome {
    pub key: StreamKey,
    pub interval: Interval,
    pub outcome: Outcome,
}

/// Result of a retrieval run
#[derive(Debug, Clone)]
pub struct RetrievalSummary {
    pub run_id: Uuid,
    pub requested: Interval,
    /// Sorted by key, then interval start
    pub outcomes: Vec<IntervalOutcome>,
    /// Corrupted streams that were not attempted
    pub skipped: Vec<(StreamKey, String)>,
}

impl RetrievalSummary {
    /// Number of intervals successfully downloaded
    pub fn downloads(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Downloaded { .. }))
            .count()
    }

    /// Number of intervals that failed
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.outcome {
                Outcome::Downloaded { bytes, .. } => bytes,
                _ => 0,
            })
            .sum()
    }

    /// Outcome table, one line per interval, then skipped streams
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in &self.outcomes {
            out.push_str(&format!("{} {} {}\n", row.key, row.interval, row.outcome));
        }
        for (key, reason) in &self.skipped {
            out.push_str(&format!("{} corrupt: {}\n", key, reason));
        }
        out
    }
}

/// Drives fetches for a plan on a bounded worker pool
pub struct FetchCoordinator {
    index: Arc<StreamIndex>,
    writer: Arc<ArchiveWriter>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    workers: usize,
}

impl FetchCoordinator {
    pub fn new(
        index: Arc<StreamIndex>,
        writer: Arc<ArchiveWriter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            index,
            writer,
            transport,
            retry: RetryPolicy::default(),
            workers: 5,
        }
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Execute a plan and report every interval's outcome
    pub async fn run(&self, plan: Plan) -> RetrievalSummary {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("retrieve", run_id = %run_id);

        async move {
            tracing::info!(
                "Fetching {} intervals for {} streams via {} ({} workers)",
                plan.missing_count(),
                plan.streams.len(),
                self.transport.name(),
                self.workers
            );

            let mut outcomes: Vec<IntervalOutcome> = stream::iter(plan.streams)
                .map(|stream_plan| self.retrieve_stream(stream_plan))
                .buffer_unordered(self.workers)
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .flatten()
                .collect();
            outcomes.sort_by(|a, b| (&a.key, a.interval).cmp(&(&b.key, b.interval)));

            RetrievalSummary {
                run_id,
                requested: plan.requested,
                outcomes,
                skipped: plan.skipped,
            }
        }
        .instrument(span)
        .await
    }

    async fn retrieve_stream(&self, stream_plan: StreamPlan) -> Vec<IntervalOutcome> {
        let StreamPlan { key, missing } = stream_plan;
        let mut outcomes = Vec::with_capacity(missing.len());

        let lock = match self.index.key_lock(&key) {
            Ok(lock) => lock,
            Err(e) => {
                let error = e.to_string();
                return missing
                    .into_iter()
                    .map(|interval| IntervalOutcome {
                        key: key.clone(),
                        interval,
                        outcome: Outcome::Failed { error: error.clone() },
                    })
                    .collect();
            }
        };
        let _guard = lock.lock().await;

        for gap in missing {
            // Another retrieval may have filled part of the gap meanwhile
            let remaining = match self.index.coverage(&key) {
                Ok(coverage) => coverage.missing(&gap),
                Err(e) => {
                    outcomes.push(IntervalOutcome {
                        key: key.clone(),
                        interval: gap,
                        outcome: Outcome::Failed { error: e.to_string() },
                    });
                    continue;
                }
            };

            if remaining.is_empty() {
                tracing::debug!("{} {} already covered", key, gap);
                outcomes.push(IntervalOutcome {
                    key: key.clone(),
                    interval: gap,
                    outcome: Outcome::AlreadyCovered,
                });
                continue;
            }

            for interval in remaining {
                let outcome = self.retrieve_interval(&key, interval).await;
                outcomes.push(IntervalOutcome {
                    key: key.clone(),
                    interval,
                    outcome,
                });
            }
        }

        outcomes
    }

    async fn retrieve_interval(&self, key: &StreamKey, interval: Interval) -> Outcome {
        let transport: &dyn Transport = self.transport.as_ref();
        let fetched = retry_with_backoff(&self.retry, move || transport.fetch(key, interval)).await;

        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to fetch {} {}: {}", key, interval, e);
                return Outcome::Failed { error: e.to_string() };
            }
        };

        if records.is_empty() {
            tracing::info!("No data for {} {}", key, interval);
            return Outcome::NoData;
        }

        // File writes, fsync and the index transaction all block
        let writer = Arc::clone(&self.writer);
        let owned_key = key.clone();
        let persisted =
            tokio::task::spawn_blocking(move || writer.persist(&owned_key, interval, &records))
                .await;

        match persisted {
            Ok(Ok(persisted)) => {
                tracing::debug!(
                    "Persisted {} {} ({} partitions, {} bytes)",
                    key,
                    interval,
                    persisted.partitions,
                    persisted.bytes
                );
                Outcome::Downloaded {
                    partitions: persisted.partitions,
                    bytes: persisted.bytes,
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to persist {} {}: {}", key, interval, e);
                Outcome::Failed { error: e.to_string() }
            }
            Err(e) => {
                tracing::error!("Persist task for {} {} did not finish: {}", key, interval, e);
                Outcome::Failed { error: e.to_string() }
            }
        }
    }
}
