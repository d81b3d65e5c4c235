//! Error types for the ingest pipeline

use mirror_common::{ItemId, MirrorError};
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Everything that can go wrong between reading the export and submitting
/// the last fingerprint
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Export parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Value(#[from] MirrorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task for item {id} failed: {cause}")]
    TaskFailed {
        id: ItemId,
        #[source]
        cause: Box<IngestError>,
    },

    #[error("Worker pool is closed to new submissions")]
    PoolClosed,

    #[error("Completion channel closed with {outstanding} results outstanding")]
    ResultsLost { outstanding: usize },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
