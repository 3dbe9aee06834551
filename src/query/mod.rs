//! Rover Query Surface
//!
//! Read-only reporting over the stream index, never touching the network:
//!
//! - **parser**: Parse command arguments (patterns, times, list formats)
//! - **report**: Render `list-index` and `list-retrieve` output
//!
//! # Commands
//!
//! ```text
//! list-index [pattern…] [partitions|coverage]
//! list-retrieve [pattern…] <start> <end>
//! ```

pub mod parser;
pub mod report;

pub use parser::{
    parse_list_index_args, parse_retrieve_args, parse_time, split_pattern, ListFormat,
    ListIndexRequest, RetrieveRequest,
};
pub use report::{list_index, list_retrieve};
