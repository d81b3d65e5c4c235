//! Error types for shared mirror values

use thiserror::Error;

/// Result type alias for mirror-common operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Error raised when a catalog value does not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Invalid item identifier {0:?}: must be non-empty without commas or whitespace")]
    InvalidIdentifier(String),

    #[error("Invalid content hash {0:?}: expected at least 4 hexadecimal characters")]
    InvalidContentHash(String),
}
