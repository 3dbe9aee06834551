//! Index Store - SQLite-backed durable form of stream coverage
//!
//! One row per contiguous interval held by a day partition. Rows for a
//! partition are only ever replaced as a whole inside a transaction, so the
//! table never holds a half-updated partition.

use crate::archive::{ArchiveResult, DayPartition, Interval, StreamKey, Timestamp};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// A row as read back from disk, before validation
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub key: StreamKey,
    pub year: i64,
    pub day: i64,
    pub path: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A row whose key is known but whose other columns cannot be decoded
#[derive(Debug, Clone)]
pub struct UnreadableRow {
    pub key: StreamKey,
    pub reason: String,
}

fn decode_row(row: &rusqlite::Row<'_>, key: &StreamKey) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        key: key.clone(),
        year: row.get(4)?,
        day: row.get(5)?,
        path: row.get(6)?,
        start: row.get(7)?,
        end: row.get(8)?,
    })
}

/// SQLite table of index entries
pub struct IndexStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl IndexStore {
    /// Create or open the index database at `path`
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Create a store that lives only as long as this value
    pub fn open_in_memory() -> ArchiveResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> ArchiveResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS stream_index (
                network TEXT NOT NULL,
                station TEXT NOT NULL,
                location TEXT NOT NULL,
                channel TEXT NOT NULL,
                year INTEGER NOT NULL,
                day INTEGER NOT NULL,
                path TEXT NOT NULL,
                start_us INTEGER NOT NULL,
                end_us INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (network, station, location, channel, year, day, start_us)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stream_time
             ON stream_index(network, station, location, channel, start_us)",
            [],
        )?;

        Ok(())
    }

    /// Read every row, in stream and time order
    ///
    /// A row whose key columns decode but whose other columns do not is
    /// returned as `Err` for that key. Rows without a readable key are
    /// skipped with a warning; they cannot be attributed to a stream.
    pub fn load_all(&self) -> ArchiveResult<Vec<Result<StoredRow, UnreadableRow>>> {
        let mut stmt = self.conn.prepare(
            "SELECT network, station, location, channel, year, day, path, start_us, end_us
             FROM stream_index
             ORDER BY network, station, location, channel, year, day, start_us",
        )?;

        let rows = stmt.query_map([], |row| {
            let key = StreamKey::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            );
            Ok(match decode_row(row, &key) {
                Ok(stored) => Ok(stored),
                Err(e) => Err(UnreadableRow {
                    key,
                    reason: format!("unreadable row: {}", e),
                }),
            })
        })?;

        let mut loaded = Vec::new();
        for row in rows {
            match row {
                Ok(row) => loaded.push(row),
                Err(e) => tracing::warn!("Skipping index row without a readable key: {}", e),
            }
        }
        Ok(loaded)
    }

    /// Read the rows of a single partition
    pub fn partition_rows(&self, partition: &DayPartition) -> ArchiveResult<Vec<Interval>> {
        let key = partition.key();
        let mut stmt = self.conn.prepare_cached(
            "SELECT start_us, end_us FROM stream_index
             WHERE network = ? AND station = ? AND location = ? AND channel = ?
               AND year = ? AND day = ?
             ORDER BY start_us",
        )?;

        let rows = stmt.query_map(
            params![
                key.network(),
                key.station(),
                key.location(),
                key.channel(),
                partition.year(),
                partition.day()
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut intervals = Vec::new();
        for row in rows {
            let (start, end) = row?;
            if let Some(interval) = Interval::try_new(start, end) {
                intervals.push(interval);
            }
        }
        Ok(intervals)
    }

    /// Replace all rows of a partition with `intervals` in one transaction
    pub fn replace_partition(
        &mut self,
        partition: &DayPartition,
        path: &Path,
        intervals: &[Interval],
    ) -> ArchiveResult<()> {
        let key = partition.key();
        let path = path.to_string_lossy();
        let created_at = chrono::Utc::now().timestamp();

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM stream_index
             WHERE network = ? AND station = ? AND location = ? AND channel = ?
               AND year = ? AND day = ?",
            params![
                key.network(),
                key.station(),
                key.location(),
                key.channel(),
                partition.year(),
                partition.day()
            ],
        )?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO stream_index
                 (network, station, location, channel, year, day, path, start_us, end_us, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;

            for interval in intervals {
                stmt.execute(params![
                    key.network(),
                    key.station(),
                    key.location(),
                    key.channel(),
                    partition.year(),
                    partition.day(),
                    path.as_ref(),
                    interval.start(),
                    interval.end(),
                    created_at
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove every row of a partition
    pub fn remove_partition(&mut self, partition: &DayPartition) -> ArchiveResult<usize> {
        self.replace_partition(partition, Path::new(""), &[])?;
        Ok(self.conn.changes() as usize)
    }

    /// Get count of rows in the index
    pub fn count(&self) -> u64 {
        let result: Result<i64, _> =
            self.conn
                .query_row("SELECT COUNT(*) FROM stream_index", [], |row| row.get(0));

        result.unwrap_or(0) as u64
    }

    /// Get count of distinct partitions in the index
    pub fn partition_count(&self) -> u64 {
        let result: Result<i64, _> = self.conn.query_row(
            "SELECT COUNT(*) FROM (SELECT DISTINCT network, station, location, channel, year, day
             FROM stream_index)",
            [],
            |row| row.get(0),
        );

        result.unwrap_or(0) as u64
    }

    /// Force checkpoint for WAL mode
    pub fn checkpoint(&mut self) -> ArchiveResult<()> {
        if self.path.is_some() {
            self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        Ok(())
    }

    /// Get the database file path (None when in memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
