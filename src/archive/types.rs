//! Core data types for the rover archive
//!
//! This module defines the fundamental types shared by every layer:
//! - `StreamKey`: Identity of one logical channel (network/station/location/channel)
//! - `StreamPattern`: Glob-style matcher over stream keys
//! - `Interval`: Half-open time range at microsecond precision
//! - `DayPartition`: One-file-per-stream-per-UTC-day storage unit
//! - `IndexEntry` and `Record`: Durable index rows and fetched payload units

use crate::config::ConfigError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use std::path::PathBuf;

/// Microseconds since the Unix epoch, UTC
pub type Timestamp = i64;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// `NaiveDate::num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Format a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffff`
pub fn format_timestamp(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_micros(ts)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| format!("{}us", ts))
}

/// Placeholder used on the wire and in reports for a blank location code
pub const BLANK_LOCATION: &str = "--";

/// Identifier for one logical time-series channel
///
/// Ordering is lexicographic by network, station, location, channel, which
/// is the order every listing uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    network: String,
    station: String,
    location: String,
    channel: String,
}

impl StreamKey {
    /// Create a key; a location of `--` is stored as the blank code
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        location: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let location = location.into();
        let location = if location == BLANK_LOCATION {
            String::new()
        } else {
            location
        };
        Self {
            network: network.into(),
            station: station.into(),
            location,
            channel: channel.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    /// Location code, empty when blank
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Location code as sent to remote services (`--` when blank)
    pub fn location_code(&self) -> &str {
        if self.location.is_empty() {
            BLANK_LOCATION
        } else {
            &self.location
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.network,
            self.station,
            self.location_code(),
            self.channel
        )
    }
}

/// Glob-style matcher over the four stream key fields
///
/// Each field supports `*` (any run of characters) and `?` (one character).
#[derive(Debug, Clone)]
pub struct StreamPattern {
    fields: [String; 4],
    matchers: [Regex; 4],
}

impl StreamPattern {
    /// Build a pattern from four field globs
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Result<Self, ConfigError> {
        let location = if location == BLANK_LOCATION { "" } else { location };
        let fields = [
            network.to_string(),
            station.to_string(),
            location.to_string(),
            channel.to_string(),
        ];

        for (idx, field) in fields.iter().enumerate() {
            if let Some(bad) = field
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '*' | '?' | '-')))
            {
                return Err(ConfigError::InvalidPattern(format!(
                    "unexpected character '{}' in {} code \"{}\"",
                    bad,
                    FIELD_NAMES[idx],
                    field
                )));
            }
            // Only the location code may be blank
            if field.is_empty() && idx != 2 {
                return Err(ConfigError::InvalidPattern(format!(
                    "{} code must not be empty",
                    FIELD_NAMES[idx]
                )));
            }
        }

        let matchers = [
            glob_to_regex(&fields[0])?,
            glob_to_regex(&fields[1])?,
            glob_to_regex(&fields[2])?,
            glob_to_regex(&fields[3])?,
        ];

        Ok(Self { fields, matchers })
    }

    /// Pattern matching every stream
    pub fn all() -> Self {
        // `*` always compiles
        Self::new("*", "*", "*", "*").unwrap_or_else(|_| unreachable!())
    }

    /// Check whether a key matches every field glob
    pub fn matches(&self, key: &StreamKey) -> bool {
        self.matchers[0].is_match(key.network())
            && self.matchers[1].is_match(key.station())
            && self.matchers[2].is_match(key.location())
            && self.matchers[3].is_match(key.channel())
    }

    /// The single key this pattern names, if it has no wildcards
    pub fn concrete_key(&self) -> Option<StreamKey> {
        if self.fields.iter().any(|f| f.contains(['*', '?'])) {
            return None;
        }
        Some(StreamKey::new(
            self.fields[0].clone(),
            self.fields[1].clone(),
            self.fields[2].clone(),
            self.fields[3].clone(),
        ))
    }

    pub fn network(&self) -> &str {
        &self.fields[0]
    }

    pub fn station(&self) -> &str {
        &self.fields[1]
    }

    /// Location glob, `--` when it names the blank location
    pub fn location(&self) -> &str {
        if self.fields[2].is_empty() {
            BLANK_LOCATION
        } else {
            &self.fields[2]
        }
    }

    pub fn channel(&self) -> &str {
        &self.fields[3]
    }
}

impl std::fmt::Display for StreamPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.network(),
            self.station(),
            self.location(),
            self.channel()
        )
    }
}

const FIELD_NAMES: [&str; 4] = ["network", "station", "location", "channel"];

fn glob_to_regex(glob: &str) -> Result<Regex, ConfigError> {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    for c in glob.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| ConfigError::InvalidPattern(e.to_string()))
}

/// Half-open time range `[start, end)` in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    start: Timestamp,
    end: Timestamp,
}

impl Interval {
    /// Create a new interval
    ///
    /// # Panics
    /// Panics if start >= end
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        assert!(start < end, "Interval: start must be less than end");
        Self { start, end }
    }

    /// Create an interval, returning None if empty or inverted
    pub fn try_new(start: Timestamp, end: Timestamp) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn duration_micros(&self) -> i64 {
        self.end - self.start
    }

    /// Check if `other` lies entirely within this interval
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check if the two intervals share at least one instant
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Intersection with another interval, if any
    pub fn intersection(&self, other: &Interval) -> Option<Self> {
        Self::try_new(self.start.max(other.start), self.end.min(other.end))
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// One file per stream per UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayPartition {
    key: StreamKey,
    year: i32,
    day: u32,
    start: Timestamp,
}

impl DayPartition {
    /// Partition for a year and day-of-year (1-based)
    pub fn from_year_day(key: StreamKey, year: i32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_yo_opt(year, day)?;
        let days = i64::from(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE);
        Some(Self {
            key,
            year,
            day,
            start: days.checked_mul(MICROS_PER_DAY)?,
        })
    }

    /// Partition holding the given instant
    pub fn containing(key: StreamKey, ts: Timestamp) -> Option<Self> {
        let days = ts.div_euclid(MICROS_PER_DAY);
        let days_ce = i32::try_from(days).ok()?.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?;
        let date = NaiveDate::from_num_days_from_ce_opt(days_ce)?;
        Some(Self {
            key,
            year: date.year(),
            day: date.ordinal(),
            start: days * MICROS_PER_DAY,
        })
    }

    /// Split an interval at UTC midnights into per-partition pieces
    pub fn split(key: &StreamKey, interval: &Interval) -> Option<Vec<(DayPartition, Interval)>> {
        let mut pieces = Vec::new();
        let mut cursor = interval.start();
        while cursor < interval.end() {
            let partition = Self::containing(key.clone(), cursor)?;
            let piece = partition.span().intersection(interval)?;
            cursor = piece.end();
            pieces.push((partition, piece));
        }
        Some(pieces)
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Day of year, 1-based
    pub fn day(&self) -> u32 {
        self.day
    }

    /// The full UTC day this partition stores
    pub fn span(&self) -> Interval {
        Interval::new(self.start, self.start + MICROS_PER_DAY)
    }

    /// Location relative to the data directory:
    /// `NET/YYYY/DDD/STA.NET.YYYY.DDD`
    pub fn relative_path(&self) -> PathBuf {
        let net = self.key.network();
        let sta = self.key.station();
        PathBuf::from(net)
            .join(format!("{:04}", self.year))
            .join(format!("{:03}", self.day))
            .join(format!("{}.{}.{:04}.{:03}", sta, net, self.year, self.day))
    }
}

impl std::fmt::Display for DayPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}.{:03}", self.year, self.day)
    }
}

/// Durable record binding part of a day partition to its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub partition: DayPartition,
    /// Path relative to the archive data directory
    pub path: PathBuf,
    /// Exact span of data held for the stream in this partition
    pub interval: Interval,
}

/// An indivisible unit of fetched payload and the time it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub span: Interval,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(span: Interval, data: Vec<u8>) -> Self {
        Self { span, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_1_2016: Timestamp = 1_451_606_400 * MICROS_PER_SECOND;

    fn anmo() -> StreamKey {
        StreamKey::new("IU", "ANMO", "00", "BHZ")
    }

    #[test]
    fn test_stream_key_ordering_and_display() {
        let mut keys = vec![
            StreamKey::new("IU", "ANMO", "10", "BHZ"),
            StreamKey::new("IU", "ANMO", "00", "BHZ"),
            StreamKey::new("II", "PFO", "--", "BHE"),
        ];
        keys.sort();

        assert_eq!(keys[0].to_string(), "II_PFO_--_BHE");
        assert_eq!(keys[0].location(), "");
        assert_eq!(keys[1].to_string(), "IU_ANMO_00_BHZ");
        assert_eq!(keys[2].to_string(), "IU_ANMO_10_BHZ");
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = StreamPattern::new("IU", "AN*", "*", "BH?").unwrap();
        assert!(pattern.matches(&anmo()));
        assert!(pattern.matches(&StreamKey::new("IU", "ANTO", "", "BH1")));
        assert!(!pattern.matches(&StreamKey::new("IU", "ANMO", "00", "LHZ")));
        assert!(!pattern.matches(&StreamKey::new("II", "ANMO", "00", "BHZ")));
        assert!(pattern.concrete_key().is_none());

        let blank = StreamPattern::new("IU", "ANMO", "--", "BHZ").unwrap();
        assert!(blank.matches(&StreamKey::new("IU", "ANMO", "", "BHZ")));
        assert!(!blank.matches(&anmo()));
        assert_eq!(blank.location(), "--");
    }

    #[test]
    fn test_pattern_rejects_invalid_codes() {
        let pattern = StreamPattern::new("I-", "*", "*", "*").unwrap();
        assert!(!pattern.matches(&anmo()));
        assert!(StreamPattern::new("IU", "AN.MO", "*", "*").is_err());
        assert!(StreamPattern::new("", "ANMO", "*", "*").is_err());
    }

    #[test]
    fn test_concrete_key() {
        let pattern = StreamPattern::new("IU", "ANMO", "00", "BHZ").unwrap();
        assert_eq!(pattern.concrete_key(), Some(anmo()));
        assert!(StreamPattern::all().matches(&anmo()));
    }

    #[test]
    fn test_interval_relations() {
        let a = Interval::new(1000, 2000);
        let b = Interval::new(1500, 2500);
        let c = Interval::new(2000, 3000);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // Adjacent, not overlapping
        assert_eq!(a.intersection(&b), Some(Interval::new(1500, 2000)));
        assert_eq!(a.intersection(&c), None);
        assert!(Interval::try_new(5, 5).is_none());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(JAN_1_2016), "2016-01-01T00:00:00.000000");
        assert_eq!(
            format_timestamp(JAN_1_2016 + 1_500_250),
            "2016-01-01T00:00:01.500250"
        );
    }

    #[test]
    fn test_day_partition_from_instant() {
        let partition = DayPartition::containing(anmo(), JAN_1_2016 + 3_600 * MICROS_PER_SECOND).unwrap();
        assert_eq!(partition.year(), 2016);
        assert_eq!(partition.day(), 1);
        assert_eq!(partition.span(), Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY));
        assert_eq!(
            partition.relative_path(),
            PathBuf::from("IU/2016/001/ANMO.IU.2016.001")
        );

        let leap = DayPartition::from_year_day(anmo(), 2016, 366).unwrap();
        assert_eq!(leap.span().start(), JAN_1_2016 + 365 * MICROS_PER_DAY);
        assert!(DayPartition::from_year_day(anmo(), 2015, 366).is_none());
    }

    #[test]
    fn test_day_partition_before_epoch() {
        let partition = DayPartition::containing(anmo(), -1).unwrap();
        assert_eq!(partition.year(), 1969);
        assert_eq!(partition.day(), 365);
    }

    #[test]
    fn test_split_at_midnight() {
        let interval = Interval::new(JAN_1_2016 + 1000, JAN_1_2016 + MICROS_PER_DAY + 25_000);
        let pieces = DayPartition::split(&anmo(), &interval).unwrap();

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].0.day(), 1);
        assert_eq!(pieces[0].1, Interval::new(JAN_1_2016 + 1000, JAN_1_2016 + MICROS_PER_DAY));
        assert_eq!(pieces[1].0.day(), 2);
        assert_eq!(
            pieces[1].1,
            Interval::new(JAN_1_2016 + MICROS_PER_DAY, JAN_1_2016 + MICROS_PER_DAY + 25_000)
        );

        let whole_day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);
        assert_eq!(DayPartition::split(&anmo(), &whole_day).unwrap().len(), 1);
    }
}
