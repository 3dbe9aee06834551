//! # Rover
//!
//! A local time-series archive that only fetches what it does not already
//! hold. Requests (stream pattern + time range) are reconciled against an
//! index of archived coverage; the missing intervals are fetched from a
//! remote service and written into one file per station per UTC day.
//!
//! ## Modules
//!
//! - [`archive`]: Data model, interval sets and the day-partition writer
//! - [`index`]: SQLite-backed stream index with in-memory coverage
//! - [`retrieval`]: Reconciler, transport, retry and fetch coordinator
//! - [`query`]: Argument parsing and `list-index` / `list-retrieve` reports
//! - [`engine`]: The `Rover` facade tying them together
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rover::{Config, Rover, StreamPattern};
//! use rover::query::parse_time;
//! use rover::retrieval::HttpTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default()?;
//!     let transport = Arc::new(HttpTransport::new(config.retrieval.http_config())?);
//!     let rover = Rover::open(config)?;
//!
//!     let pattern = StreamPattern::new("IU", "ANMO", "00", "BHZ")?;
//!     let interval = rover::Interval::new(parse_time("2016-01-01")?, parse_time("2016-01-02")?);
//!
//!     let summary = rover.retrieve(&pattern, interval, transport).await?;
//!     println!("{} downloads", summary.downloads());
//!
//!     rover.close()?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod engine;
pub mod index;
pub mod query;
pub mod retrieval;

// Re-export top-level types for convenience
pub use archive::{
    ArchiveError, ArchiveResult, ArchiveWriter, Coverage, DayPartition, IndexEntry, Interval,
    Record, StreamKey, StreamPattern, Timestamp,
};

pub use index::{IndexConfig, IndexStats, StreamIndex};

pub use retrieval::{
    FetchCoordinator, HttpTransport, Outcome, Plan, Reconciler, RetrievalSummary, RetryPolicy,
    Transport, TransportError,
};

pub use query::ListFormat;

pub use engine::Rover;

pub use config::{Config, ConfigError};
