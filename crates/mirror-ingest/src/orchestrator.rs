//! Pipeline orchestration
//!
//! # Run lifecycle
//!
//! 1. **Prepare**: load the checkpoint, obtain the export (local file or
//!    daily download) and classify it on the blocking pool.
//! 2. **Dispatch**: queue every active item on the worker pool. With
//!    credentials, resolve deleted ids batch by batch and queue those too.
//!    The pool queue is bounded, so outcomes are recorded while waiting for
//!    room in it.
//! 3. **Drain**: receive the remaining outcomes in completion order until
//!    every dispatched task has reported. Throughout dispatch and drain the
//!    checkpoint is flushed every `checkpoint_interval` completions.
//! 4. **Finalize**: flush whatever is left, shut the pool down, log counts.
//!
//! The checkpoint is only touched from this task, never from workers.

use crate::checkpoint::CheckpointStore;
use crate::classifier::Classifier;
use crate::config::{FailurePolicy, IngestConfig};
use crate::error::{IngestError, Result};
use crate::export::ExportFetcher;
use crate::http::{build_client, build_download_client};
use crate::indexer::{IndexClient, Submission};
use crate::models::{Item, ParsedInfo};
use crate::pool::WorkerPool;
use crate::resolver::DeletedItemResolver;
use crate::worker::{TaskOutcome, Worker};
use chrono::NaiveDate;
use mirror_common::ItemId;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Where the export comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSource {
    /// An already decompressed export on disk
    Local(PathBuf),
    /// The published export of that day
    Remote(NaiveDate),
}

/// Final counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Tasks dispatched to the pool
    pub total: usize,
    /// Active items processed
    pub active: usize,
    /// Deleted items processed
    pub deleted: usize,
    /// Processed items the index answered with a non-2xx status
    pub rejected: usize,
    /// Items that failed under [`FailurePolicy::Skip`]
    pub failed: usize,
    /// Deleted ids the metadata API returned nothing usable for
    pub unresolved: usize,
}

/// Counters and unflushed completions of a run in progress
#[derive(Debug, Default)]
struct Progress {
    summary: RunSummary,
    processed: usize,
    completed: HashSet<ItemId>,
}

pub struct Pipeline<'a> {
    config: &'a IngestConfig,
    checkpoint: &'a CheckpointStore,
    client: Client,
    download_client: Client,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a IngestConfig, checkpoint: &'a CheckpointStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            checkpoint,
            client: build_client(config)?,
            download_client: build_download_client(config)?,
        })
    }

    /// Prepare and run in one go
    pub async fn execute(&self, source: ExportSource, work_dir: &Path) -> Result<RunSummary> {
        let info = self.prepare(source, work_dir).await?;
        self.run(info).await
    }

    /// Load the checkpoint and classify the export
    ///
    /// Remote exports are downloaded into `work_dir`.
    pub async fn prepare(&self, source: ExportSource, work_dir: &Path) -> Result<ParsedInfo> {
        let processed = match self.checkpoint.load().await? {
            Some(ids) => {
                info!("Resuming: {} items already processed", ids.len());
                ids
            },
            None => HashSet::new(),
        };

        let path = match source {
            ExportSource::Local(path) => path,
            ExportSource::Remote(date) => {
                ExportFetcher::new(self.download_client.clone(), &self.config.export_base_url)
                    .fetch(date, work_dir)
                    .await?
            },
        };

        let classifier = Classifier::new(&self.config.static_base_url);
        let info =
            tokio::task::spawn_blocking(move || classifier.classify_path(&path, &processed))
                .await??;
        Ok(info)
    }

    /// Process every classified item and keep the checkpoint up to date
    pub async fn run(&self, info: ParsedInfo) -> Result<RunSummary> {
        let config = self.config;
        let index = IndexClient::new(self.client.clone(), &config.index_url);
        let worker = Worker::new(self.client.clone(), index, config.retry);
        let (mut pool, mut completions) =
            WorkerPool::new(worker, config.pool_size, config.completion_queue_capacity);

        let summary = match self.drive(&mut pool, &mut completions, info).await {
            Ok(summary) => summary,
            Err(e) => {
                pool.abort();
                return Err(e);
            },
        };
        pool.shutdown().await;

        info!(
            total = summary.total,
            active = summary.active,
            deleted = summary.deleted,
            rejected = summary.rejected,
            failed = summary.failed,
            unresolved = summary.unresolved,
            "Finished processing {} items ({} active, {} deleted)",
            summary.total,
            summary.active,
            summary.deleted
        );

        Ok(summary)
    }

    async fn drive(
        &self,
        pool: &mut WorkerPool,
        completions: &mut mpsc::Receiver<TaskOutcome>,
        info: ParsedInfo,
    ) -> Result<RunSummary> {
        let config = self.config;
        let ParsedInfo { active, deleted, .. } = info;
        let mut progress = Progress::default();

        for item in active.into_values() {
            self.dispatch(pool, completions, &mut progress, &deleted, item.into())
                .await?;
        }

        if !deleted.is_empty() {
            match DeletedItemResolver::from_config(self.client.clone(), config) {
                Some(resolver) => {
                    let resolved = resolver.resolve(&deleted).await?;
                    progress.summary.unresolved = deleted.len() - resolved.len();
                    if progress.summary.unresolved > 0 {
                        warn!("{} deleted items could not be resolved", progress.summary.unresolved);
                    }
                    for item in resolved.into_values() {
                        self.dispatch(pool, completions, &mut progress, &deleted, item.into())
                            .await?;
                    }
                },
                None => info!(
                    "No API credentials configured, skipping {} deleted items",
                    deleted.len()
                ),
            }
        }

        pool.close();
        info!(
            "Dispatched {} items to {} workers",
            progress.summary.total,
            pool.size()
        );

        while progress.processed < progress.summary.total {
            let outcome = completions.recv().await;
            self.record(&mut progress, &deleted, outcome).await?;
        }

        self.flush(&mut progress.completed).await;
        Ok(progress.summary)
    }

    /// Hand one item to the pool, recording completions while the queue is
    /// full
    async fn dispatch(
        &self,
        pool: &WorkerPool,
        completions: &mut mpsc::Receiver<TaskOutcome>,
        progress: &mut Progress,
        deleted: &HashSet<ItemId>,
        item: Item,
    ) -> Result<()> {
        let mut pending = Some(item);
        while let Some(item) = pending.take() {
            tokio::select! {
                slot = pool.reserve() => {
                    slot?.submit(item);
                    progress.summary.total += 1;
                },
                outcome = completions.recv() => {
                    pending = Some(item);
                    self.record(progress, deleted, outcome).await?;
                },
            }
        }
        Ok(())
    }

    async fn record(
        &self,
        progress: &mut Progress,
        deleted: &HashSet<ItemId>,
        outcome: Option<TaskOutcome>,
    ) -> Result<()> {
        let config = self.config;
        let Some(outcome) = outcome else {
            let outstanding = progress.summary.total - progress.processed;
            error!("Completion channel closed with {} results outstanding", outstanding);
            return Err(IngestError::ResultsLost { outstanding });
        };
        progress.processed += 1;

        match outcome {
            TaskOutcome::Success { id, submission } => {
                if deleted.contains(&id) {
                    progress.summary.deleted += 1;
                } else {
                    progress.summary.active += 1;
                }
                if let Submission::Rejected(_) = submission {
                    progress.summary.rejected += 1;
                }
                progress.completed.insert(id);
            },
            TaskOutcome::Failure { id, cause } => match config.failure_policy {
                FailurePolicy::Abort => {
                    error!(item_id = %id, "Item failed, aborting run: {}", cause);
                    return Err(IngestError::TaskFailed {
                        id,
                        cause: Box::new(cause),
                    });
                },
                FailurePolicy::Skip => {
                    warn!(item_id = %id, "Item failed, skipping: {}", cause);
                    progress.summary.failed += 1;
                },
            },
        }

        if progress.processed % config.checkpoint_interval == 0 {
            info!(
                "Processed {} of {} dispatched items",
                progress.processed, progress.summary.total
            );
            self.flush(&mut progress.completed).await;
        }
        Ok(())
    }

    async fn flush(&self, completed: &mut HashSet<ItemId>) {
        if let Err(e) = self.checkpoint.append(completed).await {
            warn!(
                "Could not update checkpoint {}, {} completions not recorded: {}",
                self.checkpoint.path().display(),
                completed.len(),
                e
            );
        }
        completed.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_run_still_writes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("state"));
        let config = IngestConfig::new("http://127.0.0.1:9");

        let summary = Pipeline::new(&config, &store)
            .unwrap()
            .run(ParsedInfo::default())
            .await
            .unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(store.path().exists());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deleted_items_skipped_without_credentials() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("state"));
        let config = IngestConfig::new("http://127.0.0.1:9");

        let mut info = ParsedInfo::default();
        info.deleted.insert(ItemId::parse("2").unwrap());

        let summary = Pipeline::new(&config, &store).unwrap().run(info).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.deleted, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let store = CheckpointStore::new(CheckpointStore::default_path());
        let config = IngestConfig::default();
        assert!(Pipeline::new(&config, &store).is_err());
    }
}
