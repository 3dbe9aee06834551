//! Rover Retrieval
//!
//! Turns a request (pattern + time range) into archived data:
//!
//! - **planner**: Coverage Reconciler (`requested \ coverage` per stream)
//! - **transport**: Remote data source seam and the HTTP implementation
//! - **retry**: Bounded exponential backoff for transient failures
//! - **coordinator**: Bounded-concurrency fetch + persist with a run summary

pub mod coordinator;
pub mod planner;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{FetchCoordinator, IntervalOutcome, Outcome, RetrievalSummary};
pub use planner::{Plan, Reconciler, StreamPlan};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use transport::{HttpConfig, HttpTransport, Transport, TransportError, USER_AGENT};
