//! Coverage Reconciler - requested range minus archived coverage
//!
//! ```text
//! candidates = index keys matching pattern
//!            ∪ the pattern's concrete key
//!            ∪ discovered keys matching pattern
//!        ↓
//! per key: requested \ coverage(key)   (linear walk, continuous time)
//!        ↓
//! Plan { streams with gaps, skipped corrupted streams }
//! ```
//!
//! Day partitions play no part here; a gap crossing midnight stays one gap
//! until the Archive Writer splits it.

use crate::archive::{ArchiveError, ArchiveResult, Interval, StreamKey, StreamPattern};
use crate::index::StreamIndex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Missing intervals for one stream, sorted by start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPlan {
    pub key: StreamKey,
    pub missing: Vec<Interval>,
}

/// Output of reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub requested: Interval,
    /// Streams with at least one gap, in key order
    pub streams: Vec<StreamPlan>,
    /// Corrupted streams left out of the plan, with the reason
    pub skipped: Vec<(StreamKey, String)>,
}

impl Plan {
    /// Nothing to fetch
    pub fn is_noop(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of missing intervals across all streams
    pub fn missing_count(&self) -> usize {
        self.streams.iter().map(|s| s.missing.len()).sum()
    }

    /// Every (key, gap) pair in output order
    pub fn iter(&self) -> impl Iterator<Item = (&StreamKey, &Interval)> {
        self.streams
            .iter()
            .flat_map(|s| s.missing.iter().map(move |gap| (&s.key, gap)))
    }
}

/// Computes missing intervals against the stream index
pub struct Reconciler {
    index: Arc<StreamIndex>,
}

impl Reconciler {
    pub fn new(index: Arc<StreamIndex>) -> Self {
        Self { index }
    }

    /// Plan the retrieval of `requested` for every stream matched by `pattern`
    ///
    /// `extra` keys (from remote discovery) are considered when they match.
    pub fn plan(
        &self,
        pattern: &StreamPattern,
        requested: Interval,
        extra: &[StreamKey],
    ) -> ArchiveResult<Plan> {
        let mut candidates: BTreeSet<StreamKey> = self.index.keys(pattern)?;
        candidates.extend(pattern.concrete_key());
        candidates.extend(extra.iter().filter(|key| pattern.matches(key)).cloned());

        let mut plan = Plan {
            requested,
            streams: Vec::new(),
            skipped: Vec::new(),
        };

        for key in candidates {
            match self.index.coverage(&key) {
                Ok(coverage) => {
                    let missing = coverage.missing(&requested);
                    if !missing.is_empty() {
                        plan.streams.push(StreamPlan { key, missing });
                    }
                }
                Err(ArchiveError::IndexCorruption { reason, .. }) => {
                    tracing::warn!("Skipping {}: index corrupted ({})", key, reason);
                    plan.skipped.push((key, reason));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            "Planned {} gaps over {} streams for {} {}",
            plan.missing_count(),
            plan.streams.len(),
            pattern,
            requested
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{DayPartition, MICROS_PER_DAY};
    use crate::index::IndexConfig;

    const JAN_1_2016: i64 = 1_451_606_400_000_000;

    fn anmo() -> StreamKey {
        StreamKey::new("IU", "ANMO", "00", "BHZ")
    }

    fn index_with(commits: &[(StreamKey, Interval)]) -> Arc<StreamIndex> {
        let index = StreamIndex::open_in_memory(IndexConfig::default()).unwrap();
        for (key, interval) in commits {
            let path = DayPartition::containing(key.clone(), interval.start())
                .unwrap()
                .relative_path();
            index.commit(key, *interval, &path).unwrap();
        }
        Arc::new(index)
    }

    #[test]
    fn test_empty_index_concrete_pattern() {
        let reconciler = Reconciler::new(index_with(&[]));
        let pattern = StreamPattern::new("IU", "ANMO", "00", "BHZ").unwrap();
        let day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);

        let plan = reconciler.plan(&pattern, day, &[]).unwrap();

        assert_eq!(
            plan.streams,
            vec![StreamPlan {
                key: anmo(),
                missing: vec![day]
            }]
        );
    }

    #[test]
    fn test_empty_index_wildcard_pattern_is_noop() {
        let reconciler = Reconciler::new(index_with(&[]));
        let day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);

        let plan = reconciler.plan(&StreamPattern::all(), day, &[]).unwrap();

        assert!(plan.is_noop());
    }

    #[test]
    fn test_partial_coverage_yields_only_gaps() {
        let morning = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY / 2);
        let reconciler = Reconciler::new(index_with(&[(anmo(), morning)]));
        let requested = Interval::new(JAN_1_2016, JAN_1_2016 + 2 * MICROS_PER_DAY);

        let plan = reconciler
            .plan(&StreamPattern::new("IU", "*", "*", "*").unwrap(), requested, &[])
            .unwrap();

        // One continuous gap across midnight, not split per day
        assert_eq!(
            plan.iter().collect::<Vec<_>>(),
            vec![(&anmo(), &Interval::new(JAN_1_2016 + MICROS_PER_DAY / 2, requested.end()))]
        );
    }

    #[test]
    fn test_fully_covered_is_noop() {
        let day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);
        let reconciler = Reconciler::new(index_with(&[(anmo(), day)]));

        let plan = reconciler
            .plan(&StreamPattern::new("IU", "ANMO", "00", "BHZ").unwrap(), day, &[])
            .unwrap();

        assert!(plan.is_noop());
        assert_eq!(plan.missing_count(), 0);
    }

    #[test]
    fn test_extra_keys_filtered_by_pattern() {
        let reconciler = Reconciler::new(index_with(&[]));
        let day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);
        let extra = vec![anmo(), StreamKey::new("II", "PFO", "", "BHZ")];

        let plan = reconciler
            .plan(&StreamPattern::new("IU", "*", "*", "*").unwrap(), day, &extra)
            .unwrap();

        assert_eq!(plan.streams.len(), 1);
        assert_eq!(plan.streams[0].key, anmo());
    }

    #[test]
    fn test_streams_in_key_order() {
        let a = StreamKey::new("IU", "COLA", "00", "BHZ");
        let b = StreamKey::new("IU", "ANMO", "10", "BHZ");
        let c = StreamKey::new("II", "PFO", "", "BHZ");
        let tiny = |k: &StreamKey| (k.clone(), Interval::new(JAN_1_2016, JAN_1_2016 + 10));
        let reconciler = Reconciler::new(index_with(&[tiny(&a), tiny(&b), tiny(&c)]));
        let day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);

        let plan = reconciler.plan(&StreamPattern::all(), day, &[]).unwrap();
        let keys: Vec<String> = plan.streams.iter().map(|s| s.key.to_string()).collect();

        assert_eq!(keys, vec!["II_PFO_--_BHZ", "IU_ANMO_10_BHZ", "IU_COLA_00_BHZ"]);
    }
}
