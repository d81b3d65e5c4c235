//! IQDB Mirror Ingest Library
//!
//! Mirrors a media catalog into an image similarity index. A daily catalog
//! export is classified into items that still need indexing, each item's
//! preview is fetched and reduced to a 128x128 RGB fingerprint, and the
//! fingerprint is posted to the index. Progress is checkpointed so an
//! interrupted run resumes where it stopped.
//!
//! # Components
//!
//! - [`classifier`]: export rows to active items and deleted ids
//! - [`checkpoint`]: persisted set of processed ids
//! - [`resolver`]: alternate URLs for deleted items from the metadata API
//! - [`worker`] and [`pool`]: fetch, fingerprint and submit with bounded concurrency
//! - [`orchestrator`]: dispatch, drain in completion order, checkpoint
//!
//! # Example
//!
//! ```no_run
//! use mirror_ingest::checkpoint::CheckpointStore;
//! use mirror_ingest::config::IngestConfig;
//! use mirror_ingest::orchestrator::{ExportSource, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::new("http://localhost:5588");
//!     let store = CheckpointStore::new(config.checkpoint_path.clone());
//!     let pipeline = Pipeline::new(&config, &store)?;
//!
//!     let export = ExportSource::Local("posts-2024-01-01.csv".into());
//!     let summary = pipeline.execute(export, std::path::Path::new(".")).await?;
//!     println!("{} items processed", summary.total);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod http;
pub mod indexer;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod resolver;
pub mod worker;

pub use error::{IngestError, Result};
