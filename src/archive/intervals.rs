//! Interval-set arithmetic over sorted, disjoint sequences
//!
//! `Coverage` keeps its intervals sorted by start, pairwise disjoint and
//! separated by more than the merge tolerance. Every operation preserves that
//! invariant, so subtraction can walk the sequence once.
//!
//! # Performance
//! - Insert: O(log n) search + O(k) merge of the k touched intervals
//! - Subtract: O(log n + k) where k = intervals overlapping the request

use crate::archive::types::Interval;

/// Ordered set of non-overlapping, non-adjacent intervals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    intervals: Vec<Interval>,
    /// Largest gap (microseconds) still treated as contiguous
    tolerance: i64,
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coverage that merges intervals separated by at most `tolerance`
    pub fn with_tolerance(tolerance: i64) -> Self {
        Self {
            intervals: Vec::new(),
            tolerance: tolerance.max(0),
        }
    }

    /// Build from arbitrary (unsorted, overlapping) intervals
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut coverage = Self::new();
        for interval in intervals {
            coverage.insert(interval);
        }
        coverage
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Earliest start to latest end
    pub fn bounds(&self) -> Option<Interval> {
        let first = self.intervals.first()?;
        let last = self.intervals.last()?;
        Some(Interval::new(first.start(), last.end()))
    }

    pub fn total_micros(&self) -> i64 {
        self.intervals.iter().map(Interval::duration_micros).sum()
    }

    /// Insert an interval, merging with any interval it overlaps or touches
    ///
    /// Returns false when the interval was already fully covered.
    pub fn insert(&mut self, interval: Interval) -> bool {
        if self.contains(&interval) {
            return false;
        }

        let tolerance = self.tolerance;
        // First interval whose end reaches the new start (within tolerance)
        let lo = self
            .intervals
            .partition_point(|iv| iv.end().saturating_add(tolerance) < interval.start());
        // One past the last interval whose start is reachable from the new end
        let hi = self
            .intervals
            .partition_point(|iv| iv.start() <= interval.end().saturating_add(tolerance));

        let mut start = interval.start();
        let mut end = interval.end();
        if lo < hi {
            start = start.min(self.intervals[lo].start());
            end = end.max(self.intervals[hi - 1].end());
        }

        self.intervals
            .splice(lo..hi, std::iter::once(Interval::new(start, end)));
        true
    }

    /// Check if the interval lies entirely inside one covered interval
    pub fn contains(&self, interval: &Interval) -> bool {
        let idx = self
            .intervals
            .partition_point(|iv| iv.end() < interval.end());
        self.intervals
            .get(idx)
            .map(|iv| iv.contains(interval))
            .unwrap_or(false)
    }

    /// Restrict the coverage to a window
    pub fn clip(&self, window: &Interval) -> Coverage {
        Coverage {
            intervals: self
                .intervals
                .iter()
                .filter_map(|iv| iv.intersection(window))
                .collect(),
            tolerance: self.tolerance,
        }
    }

    /// The parts of `requested` not covered, sorted by start
    pub fn missing(&self, requested: &Interval) -> Vec<Interval> {
        let mut gaps = Vec::new();
        let mut cursor = requested.start();

        let first = self
            .intervals
            .partition_point(|iv| iv.end() <= requested.start());

        for iv in &self.intervals[first..] {
            if iv.start() >= requested.end() {
                break;
            }
            if iv.start() > cursor {
                gaps.push(Interval::new(cursor, iv.start()));
            }
            cursor = cursor.max(iv.end());
            if cursor >= requested.end() {
                break;
            }
        }

        if cursor < requested.end() {
            gaps.push(Interval::new(cursor, requested.end()));
        }

        gaps
    }
}

impl FromIterator<Interval> for Coverage {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        Self::from_intervals(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: i64, end: i64) -> Interval {
        Interval::new(start, end)
    }

    #[test]
    fn test_insert_keeps_sorted_disjoint() {
        let mut coverage = Coverage::new();
        assert!(coverage.insert(iv(50, 60)));
        assert!(coverage.insert(iv(10, 20)));
        assert!(coverage.insert(iv(30, 40)));

        assert_eq!(coverage.intervals(), &[iv(10, 20), iv(30, 40), iv(50, 60)]);
    }

    #[test]
    fn test_insert_merges_adjacent() {
        let mut coverage = Coverage::new();
        coverage.insert(iv(10, 20));
        coverage.insert(iv(20, 30));

        assert_eq!(coverage.intervals(), &[iv(10, 30)]);
    }

    #[test]
    fn test_insert_bridges_several() {
        let mut coverage = Coverage::from_intervals([iv(10, 20), iv(30, 40), iv(50, 60), iv(80, 90)]);
        coverage.insert(iv(15, 55));

        assert_eq!(coverage.intervals(), &[iv(10, 60), iv(80, 90)]);
    }

    #[test]
    fn test_insert_subset_is_noop() {
        let mut coverage = Coverage::from_intervals([iv(10, 100)]);
        assert!(!coverage.insert(iv(20, 30)));
        assert!(!coverage.insert(iv(10, 100)));
        assert_eq!(coverage.intervals(), &[iv(10, 100)]);
    }

    #[test]
    fn test_insert_overlap_expands_to_union() {
        let mut coverage = Coverage::from_intervals([iv(10, 100)]);
        assert!(coverage.insert(iv(50, 150)));
        assert_eq!(coverage.intervals(), &[iv(10, 150)]);
    }

    #[test]
    fn test_tolerance_merges_small_gaps() {
        let mut coverage = Coverage::with_tolerance(5);
        coverage.insert(iv(10, 20));
        coverage.insert(iv(24, 30));
        coverage.insert(iv(40, 50));

        assert_eq!(coverage.intervals(), &[iv(10, 30), iv(40, 50)]);
    }

    #[test]
    fn test_missing_empty_coverage() {
        let coverage = Coverage::new();
        assert_eq!(coverage.missing(&iv(0, 100)), vec![iv(0, 100)]);
    }

    #[test]
    fn test_missing_full_coverage() {
        let coverage = Coverage::from_intervals([iv(0, 100)]);
        assert!(coverage.missing(&iv(0, 100)).is_empty());
        assert!(coverage.missing(&iv(20, 30)).is_empty());
    }

    #[test]
    fn test_missing_partial_coverage() {
        let coverage = Coverage::from_intervals([iv(10, 20), iv(40, 50), iv(90, 200)]);
        let gaps = coverage.missing(&iv(0, 100));

        assert_eq!(gaps, vec![iv(0, 10), iv(20, 40), iv(50, 90)]);
    }

    #[test]
    fn test_missing_ignores_coverage_outside_request() {
        let coverage = Coverage::from_intervals([iv(0, 10), iv(200, 300)]);
        assert_eq!(coverage.missing(&iv(10, 200)), vec![iv(10, 200)]);
    }

    #[test]
    fn test_missing_is_exact_complement() {
        let coverage = Coverage::from_intervals([iv(5, 15), iv(22, 23), iv(30, 45), iv(47, 60)]);
        let requested = iv(0, 50);
        let gaps = coverage.missing(&requested);

        // Gaps and coverage tile the request with no overlap
        for gap in &gaps {
            assert!(requested.contains(gap));
            assert!(coverage.intervals().iter().all(|c| !c.overlaps(gap)));
        }
        for w in gaps.windows(2) {
            assert!(w[0].end() < w[1].start());
        }
        let covered = coverage.clip(&requested).total_micros();
        let missing: i64 = gaps.iter().map(Interval::duration_micros).sum();
        assert_eq!(covered + missing, requested.duration_micros());
    }

    #[test]
    fn test_contains() {
        let coverage = Coverage::from_intervals([iv(10, 20), iv(30, 40)]);

        assert!(coverage.contains(&iv(12, 18)));
        assert!(coverage.contains(&iv(30, 40)));
        assert!(!coverage.contains(&iv(15, 35)));
        assert!(!coverage.contains(&iv(20, 30)));
    }

    #[test]
    fn test_clip_and_bounds() {
        let a = Coverage::from_intervals([iv(0, 10), iv(20, 30)]);

        assert_eq!(a.clip(&iv(5, 25)).intervals(), &[iv(5, 10), iv(20, 25)]);
        assert_eq!(a.bounds(), Some(iv(0, 30)));
    }
}
