//! Stream Index - which time spans of which streams are archived
//!
//! Combines the durable `IndexStore` with an in-memory map of merged
//! `Coverage` per stream:
//!
//! ```text
//! commit(key, interval, path)
//!    ↓  store mutex (writers serialized)
//! replace partition rows in one SQLite transaction
//!    ↓
//! swap Arc<Coverage> for the key (readers see old or new, never partial)
//! ```
//!
//! Streams whose persisted rows fail validation are quarantined as corrupted:
//! they are reported, never planned or committed, and do not affect others.

use crate::archive::{
    ArchiveError, ArchiveResult, Coverage, DayPartition, IndexEntry, Interval, StreamKey,
    StreamPattern,
};
use crate::index::store::{IndexStore, StoredRow};
use crate::index::IndexStats;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Configuration for the stream index
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Gaps up to this many microseconds are treated as covered
    pub merge_tolerance_us: i64,
}

/// Catalog of archived coverage per stream
pub struct StreamIndex {
    store: Mutex<IndexStore>,
    coverage: RwLock<BTreeMap<StreamKey, Arc<Coverage>>>,
    corrupted: RwLock<BTreeMap<StreamKey, String>>,
    /// Per-stream locks held across "re-check gap, fetch, persist"
    key_locks: Mutex<HashMap<StreamKey, Arc<tokio::sync::Mutex<()>>>>,
    config: IndexConfig,
}

impl StreamIndex {
    /// Open (or create) an index database
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        Self::with_config(path, IndexConfig::default())
    }

    /// Open with custom configuration
    pub fn with_config(path: &Path, config: IndexConfig) -> ArchiveResult<Self> {
        Self::from_store(IndexStore::open(path)?, config)
    }

    /// In-memory index, for tests and dry runs
    pub fn open_in_memory(config: IndexConfig) -> ArchiveResult<Self> {
        Self::from_store(IndexStore::open_in_memory()?, config)
    }

    fn from_store(store: IndexStore, config: IndexConfig) -> ArchiveResult<Self> {
        let location = store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory".to_string());
        let index = Self {
            store: Mutex::new(store),
            coverage: RwLock::new(BTreeMap::new()),
            corrupted: RwLock::new(BTreeMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            config,
        };

        index.reload()?;

        let stats = index.stats()?;
        tracing::info!(
            "Loaded index from {}: {} streams, {} entries, {} partitions ({} corrupted)",
            location,
            stats.streams,
            stats.entries,
            stats.partitions,
            stats.corrupted
        );
        Ok(index)
    }

    // ==================== Query Methods ====================

    /// All healthy streams matching `pattern`, in key order
    pub fn lookup(&self, pattern: &StreamPattern) -> ArchiveResult<Vec<(StreamKey, Arc<Coverage>)>> {
        let coverage = self.read_coverage()?;
        Ok(coverage
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, cov)| (key.clone(), Arc::clone(cov)))
            .collect())
    }

    /// Every known stream matching `pattern`, corrupted ones included
    pub fn keys(&self, pattern: &StreamPattern) -> ArchiveResult<BTreeSet<StreamKey>> {
        let mut keys: BTreeSet<StreamKey> = self
            .read_coverage()?
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();
        keys.extend(
            self.read_corrupted()?
                .keys()
                .filter(|key| pattern.matches(key))
                .cloned(),
        );
        Ok(keys)
    }

    /// Corrupted streams matching `pattern`, with the reason
    pub fn corrupted(&self, pattern: &StreamPattern) -> ArchiveResult<Vec<(StreamKey, String)>> {
        Ok(self
            .read_corrupted()?
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, reason)| (key.clone(), reason.clone()))
            .collect())
    }

    /// Merged coverage for an exact key; empty if unknown
    pub fn coverage(&self, key: &StreamKey) -> ArchiveResult<Arc<Coverage>> {
        if let Some(reason) = self.read_corrupted()?.get(key) {
            return Err(ArchiveError::IndexCorruption {
                key: key.to_string(),
                reason: reason.clone(),
            });
        }

        Ok(self
            .read_coverage()?
            .get(key)
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::new(Coverage::with_tolerance(self.config.merge_tolerance_us))))
    }

    /// Index entries for healthy streams matching `pattern`,
    /// sorted by key, year, day and start
    pub fn entries(&self, pattern: &StreamPattern) -> ArchiveResult<Vec<IndexEntry>> {
        let rows = self.lock_store()?.load_all()?;
        let corrupted = self.read_corrupted()?;

        let mut entries: Vec<IndexEntry> = rows
            .iter()
            .filter_map(|row| row.as_ref().ok())
            .filter(|row| pattern.matches(&row.key) && !corrupted.contains_key(&row.key))
            .filter_map(|row| validate_row(row).ok())
            .collect();
        entries.sort_by(|a, b| {
            (&a.partition, a.interval).cmp(&(&b.partition, b.interval))
        });
        Ok(entries)
    }

    /// Lock serializing retrieval work for one stream
    pub fn key_lock(&self, key: &StreamKey) -> ArchiveResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|e| ArchiveError::Lock(format!("Failed to acquire key lock table: {}", e)))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    // ==================== Update Methods ====================

    /// Record that `interval` of `key` is now held in the file at `location`
    ///
    /// The interval must lie within one UTC day. Returns false when it was
    /// already covered, in which case nothing is written.
    pub fn commit(&self, key: &StreamKey, interval: Interval, location: &Path) -> ArchiveResult<bool> {
        let partition = DayPartition::containing(key.clone(), interval.start()).ok_or_else(|| {
            ArchiveError::InvalidInterval(format!("{} is outside the supported calendar", interval))
        })?;
        if !partition.span().contains(&interval) {
            return Err(ArchiveError::InvalidInterval(format!(
                "{} spans more than one day partition",
                interval
            )));
        }

        let mut store = self.lock_store()?;

        let current = self.coverage(key)?;
        if current.contains(&interval) {
            tracing::debug!("{} already covers {}", key, interval);
            return Ok(false);
        }

        let mut day = Coverage::from_intervals(store.partition_rows(&partition)?);
        day.insert(interval);
        store.replace_partition(&partition, location, day.intervals())?;

        let mut updated = (*current).clone();
        updated.insert(interval);
        self.write_coverage()?.insert(key.clone(), Arc::new(updated));

        tracing::debug!("Committed {} {} in {}", key, interval, partition);
        Ok(true)
    }

    /// Drop entries whose file no longer exists under `data_dir`
    ///
    /// Returns the number of partitions removed.
    pub fn prune_missing(&self, data_dir: &Path) -> ArchiveResult<usize> {
        let mut store = self.lock_store()?;

        let missing: BTreeSet<DayPartition> = store
            .load_all()?
            .iter()
            .filter_map(|row| row.as_ref().ok())
            .filter_map(|row| validate_row(row).ok())
            .filter(|entry| !data_dir.join(&entry.path).exists())
            .map(|entry| entry.partition)
            .collect();

        for partition in &missing {
            tracing::warn!(
                "Removing index entries for {} {}: file {:?} is missing",
                partition.key(),
                partition,
                data_dir.join(partition.relative_path())
            );
            store.remove_partition(partition)?;
        }

        if !missing.is_empty() {
            self.rebuild(&store)?;
        }
        Ok(missing.len())
    }

    /// Rebuild in-memory state from the store
    pub fn reload(&self) -> ArchiveResult<()> {
        let store = self.lock_store()?;
        self.rebuild(&store)
    }

    fn rebuild(&self, store: &IndexStore) -> ArchiveResult<()> {
        let mut per_key: BTreeMap<StreamKey, Vec<Interval>> = BTreeMap::new();
        let mut corrupted: BTreeMap<StreamKey, String> = BTreeMap::new();

        for row in store.load_all()? {
            let checked = match row {
                Ok(row) => validate_row(&row).map_err(|reason| (row.key, reason)),
                Err(unreadable) => Err((unreadable.key, unreadable.reason)),
            };
            match checked {
                Ok(entry) => per_key
                    .entry(entry.partition.key().clone())
                    .or_default()
                    .push(entry.interval),
                Err((key, reason)) => {
                    tracing::error!("Index corruption for {}: {}", key, reason);
                    corrupted.entry(key).or_insert(reason);
                }
            }
        }

        let tolerance = self.config.merge_tolerance_us;
        let coverage = per_key
            .into_iter()
            .filter(|(key, _)| !corrupted.contains_key(key))
            .map(|(key, intervals)| {
                let mut cov = Coverage::with_tolerance(tolerance);
                for interval in intervals {
                    cov.insert(interval);
                }
                (key, Arc::new(cov))
            })
            .collect();

        *self.write_coverage()? = coverage;
        *self
            .corrupted
            .write()
            .map_err(|e| ArchiveError::Lock(format!("Failed to acquire corruption lock: {}", e)))? =
            corrupted;
        Ok(())
    }

    // ==================== Lifecycle Methods ====================

    /// Flush the index to disk
    pub fn close(&self) -> ArchiveResult<()> {
        self.lock_store()?.checkpoint()
    }

    /// Get statistics about the index
    pub fn stats(&self) -> ArchiveResult<IndexStats> {
        let (entries, partitions) = {
            let store = self.lock_store()?;
            (store.count(), store.partition_count())
        };
        Ok(IndexStats {
            streams: self.read_coverage()?.len(),
            corrupted: self.read_corrupted()?.len(),
            entries,
            partitions,
        })
    }

    // ==================== Lock Helpers ====================

    fn lock_store(&self) -> ArchiveResult<MutexGuard<'_, IndexStore>> {
        self.store
            .lock()
            .map_err(|e| ArchiveError::Lock(format!("Failed to acquire index lock: {}", e)))
    }

    fn read_coverage(
        &self,
    ) -> ArchiveResult<std::sync::RwLockReadGuard<'_, BTreeMap<StreamKey, Arc<Coverage>>>> {
        self.coverage
            .read()
            .map_err(|e| ArchiveError::Lock(format!("Failed to read coverage: {}", e)))
    }

    fn write_coverage(
        &self,
    ) -> ArchiveResult<std::sync::RwLockWriteGuard<'_, BTreeMap<StreamKey, Arc<Coverage>>>> {
        self.coverage
            .write()
            .map_err(|e| ArchiveError::Lock(format!("Failed to write coverage: {}", e)))
    }

    fn read_corrupted(
        &self,
    ) -> ArchiveResult<std::sync::RwLockReadGuard<'_, BTreeMap<StreamKey, String>>> {
        self.corrupted
            .read()
            .map_err(|e| ArchiveError::Lock(format!("Failed to read corruption list: {}", e)))
    }

    #[cfg(test)]
    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&IndexStore) -> T) -> T {
        let store = self.store.lock().unwrap();
        f(&store)
    }
}

/// Check a stored row against the partition it claims to belong to
fn validate_row(row: &StoredRow) -> Result<IndexEntry, String> {
    let year = i32::try_from(row.year).map_err(|_| format!("invalid year {}", row.year))?;
    let day = u32::try_from(row.day).map_err(|_| format!("invalid day {}", row.day))?;
    let partition = DayPartition::from_year_day(row.key.clone(), year, day)
        .ok_or_else(|| format!("invalid partition {}.{}", row.year, row.day))?;

    let interval = Interval::try_new(row.start, row.end)
        .ok_or_else(|| format!("empty interval {}..{} in {}", row.start, row.end, partition))?;

    if !partition.span().contains(&interval) {
        return Err(format!("interval {} lies outside partition {}", interval, partition));
    }

    Ok(IndexEntry {
        partition,
        path: PathBuf::from(&row.path),
        interval,
    })
}
