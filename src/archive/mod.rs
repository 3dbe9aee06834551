//! Rover Archive
//!
//! The local, day-partitioned store of time-series payload:
//!
//! - **types**: Core data structures (StreamKey, Interval, DayPartition, Record)
//! - **intervals**: Sorted disjoint interval sets (`Coverage`)
//! - **writer**: Splits fetched data at UTC midnights and commits it
//! - **error**: Error types
//!
//! # Layout
//!
//! ```text
//! <data_dir>/IU/2016/001/ANMO.IU.2016.001
//!            │   │    │   └─ one file per station per UTC day
//!            │   │    └─ day of year
//!            │   └─ year
//!            └─ network
//! ```

pub mod error;
pub mod intervals;
pub mod types;
pub mod writer;

pub use error::{ArchiveError, ArchiveResult};
pub use intervals::Coverage;
pub use types::{
    format_timestamp, DayPartition, IndexEntry, Interval, Record, StreamKey, StreamPattern,
    Timestamp, BLANK_LOCATION, MICROS_PER_DAY, MICROS_PER_SECOND,
};
pub use writer::{ArchiveWriter, Persisted};
