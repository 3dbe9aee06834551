//! Query Surface renderers
//!
//! Plain-text listings of index contents and planner output. Output depends
//! only on index state, so identical state gives byte-identical text.
//!
//! ```text
//! list-index (partitions):  KEY YYYY.DDD START END PATH
//! list-index (coverage):    KEY START END
//! list-retrieve:            KEY START END
//! corrupted streams:        KEY corrupt: REASON
//! ```

use crate::archive::{ArchiveResult, StreamPattern};
use crate::index::StreamIndex;
use crate::query::parser::ListFormat;
use crate::retrieval::Plan;
use std::fmt::Write;

/// Render the index contents matching `pattern`
pub fn list_index(
    index: &StreamIndex,
    pattern: &StreamPattern,
    format: ListFormat,
) -> ArchiveResult<String> {
    let mut out = String::new();

    match format {
        ListFormat::Partitions => {
            for entry in index.entries(pattern)? {
                let _ = writeln!(
                    out,
                    "{} {} {} {}",
                    entry.partition.key(),
                    entry.partition,
                    entry.interval,
                    entry.path.display()
                );
            }
        }
        ListFormat::Coverage => {
            for (key, coverage) in index.lookup(pattern)? {
                for interval in coverage.intervals() {
                    let _ = writeln!(out, "{} {}", key, interval);
                }
            }
        }
    }

    for (key, reason) in index.corrupted(pattern)? {
        let _ = writeln!(out, "{} corrupt: {}", key, reason);
    }

    Ok(out)
}

/// Render the missing intervals of a plan
pub fn list_retrieve(plan: &Plan) -> String {
    let mut out = String::new();
    for (key, gap) in plan.iter() {
        let _ = writeln!(out, "{} {}", key, gap);
    }
    for (key, reason) in &plan.skipped {
        let _ = writeln!(out, "{} corrupt: {}", key, reason);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{DayPartition, Interval, StreamKey, MICROS_PER_DAY};
    use crate::index::IndexConfig;
    use crate::retrieval::Reconciler;
    use std::sync::Arc;

    const JAN_1_2016: i64 = 1_451_606_400_000_000;

    fn populated() -> Arc<StreamIndex> {
        let index = StreamIndex::open_in_memory(IndexConfig::default()).unwrap();
        let key = StreamKey::new("IU", "ANMO", "00", "BHZ");
        let midnight = JAN_1_2016 + MICROS_PER_DAY;
        for interval in [
            Interval::new(JAN_1_2016, midnight),
            Interval::new(midnight, midnight + 25_000),
        ] {
            let path = DayPartition::containing(key.clone(), interval.start())
                .unwrap()
                .relative_path();
            index.commit(&key, interval, &path).unwrap();
        }
        Arc::new(index)
    }

    #[test]
    fn test_list_index_partitions() {
        let index = populated();
        let out = list_index(&index, &StreamPattern::all(), ListFormat::Partitions).unwrap();

        assert_eq!(
            out,
            "IU_ANMO_00_BHZ 2016.001 2016-01-01T00:00:00.000000 2016-01-02T00:00:00.000000 IU/2016/001/ANMO.IU.2016.001\n\
             IU_ANMO_00_BHZ 2016.002 2016-01-02T00:00:00.000000 2016-01-02T00:00:00.025000 IU/2016/002/ANMO.IU.2016.002\n"
        );
    }

    #[test]
    fn test_list_index_coverage_is_merged() {
        let index = populated();
        let out = list_index(&index, &StreamPattern::all(), ListFormat::Coverage).unwrap();

        assert_eq!(
            out,
            "IU_ANMO_00_BHZ 2016-01-01T00:00:00.000000 2016-01-02T00:00:00.025000\n"
        );
    }

    #[test]
    fn test_list_index_no_match_is_empty() {
        let index = populated();
        let pattern = StreamPattern::new("II", "*", "*", "*").unwrap();
        assert_eq!(list_index(&index, &pattern, ListFormat::Partitions).unwrap(), "");
    }

    #[test]
    fn test_list_retrieve_reports_gaps_only() {
        let index = populated();
        let requested = Interval::new(JAN_1_2016, JAN_1_2016 + 2 * MICROS_PER_DAY);
        let plan = Reconciler::new(Arc::clone(&index))
            .plan(&StreamPattern::all(), requested, &[])
            .unwrap();

        assert_eq!(
            list_retrieve(&plan),
            "IU_ANMO_00_BHZ 2016-01-02T00:00:00.025000 2016-01-03T00:00:00.000000\n"
        );
    }
}
