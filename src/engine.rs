//! Rover - archive facade
//!
//! Owns the stream index for the lifetime of a command and wires the
//! layers together:
//!
//! ```text
//! retrieve:      prune missing files → discover → plan → fetch + persist
//! list-retrieve: plan (local candidates only) → report
//! list-index:    index → report
//! ```

use crate::archive::{ArchiveResult, ArchiveWriter, Interval, StreamPattern};
use crate::config::Config;
use crate::index::{IndexConfig, IndexStats, StreamIndex};
use crate::query::{self, ListFormat};
use crate::retrieval::{FetchCoordinator, Plan, Reconciler, RetrievalSummary, Transport};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The local archive and everything needed to fill it
pub struct Rover {
    config: Config,
    data_dir: PathBuf,
    index: Arc<StreamIndex>,
    writer: Arc<ArchiveWriter>,
    reconciler: Reconciler,
}

impl Rover {
    /// Open the archive described by `config`
    pub fn open(config: Config) -> ArchiveResult<Self> {
        let index = StreamIndex::with_config(&config.index_path(), Self::index_config(&config))?;
        Ok(Self::with_index(config, index))
    }

    /// Open with an index that lives only in memory
    pub fn open_in_memory(config: Config) -> ArchiveResult<Self> {
        let index = StreamIndex::open_in_memory(Self::index_config(&config))?;
        Ok(Self::with_index(config, index))
    }

    fn index_config(config: &Config) -> IndexConfig {
        IndexConfig {
            merge_tolerance_us: config.archive.merge_tolerance_us,
        }
    }

    fn with_index(config: Config, index: StreamIndex) -> Self {
        let data_dir = config.data_dir();
        let index = Arc::new(index);
        let writer = Arc::new(
            ArchiveWriter::new(&data_dir, Arc::clone(&index))
                .cover_remote_gaps(config.retrieval.cover_remote_gaps),
        );
        let reconciler = Reconciler::new(Arc::clone(&index));

        tracing::debug!("Archive at {:?}", data_dir);
        Self {
            config,
            data_dir,
            index,
            writer,
            reconciler,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index(&self) -> &Arc<StreamIndex> {
        &self.index
    }

    pub fn stats(&self) -> ArchiveResult<IndexStats> {
        self.index.stats()
    }

    /// Missing intervals for `pattern` over `interval`, from local state only
    pub fn plan(&self, pattern: &StreamPattern, interval: Interval) -> ArchiveResult<Plan> {
        self.reconciler.plan(pattern, interval, &[])
    }

    /// Fetch and archive everything missing for `pattern` over `interval`
    pub async fn retrieve(
        &self,
        pattern: &StreamPattern,
        interval: Interval,
        transport: Arc<dyn Transport>,
    ) -> ArchiveResult<RetrievalSummary> {
        if self.config.archive.verify_files {
            let pruned = self.index.prune_missing(&self.data_dir)?;
            if pruned > 0 {
                tracing::warn!("Dropped {} index partitions with missing files", pruned);
            }
        }

        let discovered = if pattern.concrete_key().is_none() {
            match transport.discover(pattern, interval).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!("Stream discovery for {} failed: {}", pattern, e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let plan = self.reconciler.plan(pattern, interval, &discovered)?;

        let coordinator = FetchCoordinator::new(
            Arc::clone(&self.index),
            Arc::clone(&self.writer),
            transport,
        )
        .retry_policy(self.config.retrieval.retry_policy())
        .workers(self.config.retrieval.workers);

        let summary = coordinator.run(plan).await;
        tracing::info!("{} downloads", summary.downloads());
        if summary.failures() > 0 {
            tracing::warn!("{} intervals failed", summary.failures());
        }
        Ok(summary)
    }

    /// `list-index` report
    pub fn list_index(&self, pattern: &StreamPattern, format: ListFormat) -> ArchiveResult<String> {
        query::list_index(&self.index, pattern, format)
    }

    /// `list-retrieve` report
    pub fn list_retrieve(&self, pattern: &StreamPattern, interval: Interval) -> ArchiveResult<String> {
        Ok(query::list_retrieve(&self.plan(pattern, interval)?))
    }

    /// Flush the index and release the archive
    pub fn close(self) -> ArchiveResult<()> {
        self.index.close()?;
        tracing::debug!("Archive closed");
        Ok(())
    }
}
