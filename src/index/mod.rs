//! Rover Stream Index
//!
//! Tracks which time spans of which streams are present in the archive:
//!
//! - **IndexStore**: SQLite table of index entries (one row per contiguous
//!   interval per day partition)
//! - **StreamIndex**: In-memory merged coverage per stream, rebuilt from the
//!   store on open and swapped atomically on every commit
//!
//! # Architecture
//!
//! ```text
//! Query: "what do we hold for IU_ANMO_*_BH?"
//!        ↓
//! StreamIndex::lookup → [(IU_ANMO_00_BHZ, Coverage), (IU_ANMO_10_BHZ, Coverage)]
//!        ↓
//! Coverage::missing(requested) → gaps to fetch
//! ```

mod store;
mod stream_index;

pub use store::{IndexStore, StoredRow, UnreadableRow};
pub use stream_index::{IndexConfig, StreamIndex};

/// Statistics about index contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of healthy streams with coverage
    pub streams: usize,
    /// Number of streams quarantined as corrupted
    pub corrupted: usize,
    /// Number of index rows
    pub entries: u64,
    /// Number of distinct day partitions
    pub partitions: u64,
}
