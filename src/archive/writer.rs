//! Archive Writer - persists fetched records into day partition files
//!
//! Write path:
//! ```text
//! Records → split covered span at UTC midnights
//!         → per day: append records, fsync
//!         → per day: StreamIndex::commit(sub-interval)
//! ```
//!
//! A record is only appended to a day file when its part of that day is not
//! already covered for the key, so re-fetching one day of a record that
//! crosses midnight leaves the other day's file untouched.
//!
//! A crash between the fsync and the commit leaves bytes on disk that the
//! index does not know about; the next retrieval sees the gap and re-fetches.

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::intervals::Coverage;
use crate::archive::types::{DayPartition, IndexEntry, Interval, Record, StreamKey};
use crate::index::StreamIndex;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of persisting one fetched interval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Persisted {
    /// Index entries that changed coverage
    pub entries: Vec<IndexEntry>,
    /// Day files written to
    pub partitions: usize,
    /// Payload bytes appended across all day files
    pub bytes: u64,
}

/// Writes records under the data directory and commits them to the index
pub struct ArchiveWriter {
    data_dir: PathBuf,
    index: Arc<StreamIndex>,
    /// Treat the whole requested interval as covered once any data arrived
    cover_remote_gaps: bool,
}

impl ArchiveWriter {
    pub fn new(data_dir: impl Into<PathBuf>, index: Arc<StreamIndex>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index,
            cover_remote_gaps: true,
        }
    }

    pub fn cover_remote_gaps(mut self, enabled: bool) -> Self {
        self.cover_remote_gaps = enabled;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Persist the records fetched for `requested`
    ///
    /// An empty record list writes nothing and commits nothing.
    pub fn persist(
        &self,
        key: &StreamKey,
        requested: Interval,
        records: &[Record],
    ) -> ArchiveResult<Persisted> {
        if records.is_empty() {
            return Ok(Persisted::default());
        }

        let mut covered: Coverage = records.iter().map(|r| r.span).collect();
        if self.cover_remote_gaps {
            covered.insert(requested);
        }

        let mut days: BTreeMap<DayPartition, Vec<Interval>> = BTreeMap::new();
        for interval in covered.intervals() {
            let pieces = DayPartition::split(key, interval).ok_or_else(|| {
                ArchiveError::InvalidInterval(format!("{} is outside the supported calendar", interval))
            })?;
            for (partition, piece) in pieces {
                days.entry(partition).or_default().push(piece);
            }
        }

        // Records already archived for this key are not written again
        let existing = self.index.coverage(key)?;

        let mut result = Persisted::default();
        for (partition, pieces) in days {
            let relative = partition.relative_path();
            let day = partition.span();
            let day_records = records.iter().filter(|r| {
                r.span
                    .intersection(&day)
                    .map_or(false, |in_day| !existing.contains(&in_day))
            });

            result.bytes += self.append(&relative, day_records)?;
            result.partitions += 1;

            for piece in pieces {
                if self.index.commit(key, piece, &relative)? {
                    result.entries.push(IndexEntry {
                        partition: partition.clone(),
                        path: relative.clone(),
                        interval: piece,
                    });
                }
            }
            tracing::debug!("Wrote {} {} to {:?}", key, partition, relative);
        }

        Ok(result)
    }

    /// Append records to a day file and fsync it
    fn append<'a>(
        &self,
        relative: &Path,
        records: impl Iterator<Item = &'a Record>,
    ) -> ArchiveResult<u64> {
        let path = self.data_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        for record in records {
            writer.write_all(&record.data)?;
            written += record.data.len() as u64;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;

        Ok(written)
    }
}
