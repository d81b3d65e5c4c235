//! IQDB Mirror Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the IQDB mirror workspace.
//!
//! # Overview
//!
//! - **Types**: validated catalog identifiers and content hashes
//! - **Error Handling**: the error raised when those values are malformed
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use mirror_common::{ContentHash, ItemId, Result};
//!
//! fn preview_path(id: &str, md5: &str) -> Result<String> {
//!     let id = ItemId::parse(id)?;
//!     let hash = ContentHash::parse(md5)?;
//!     Ok(format!("{} -> {}", id, hash.shard_path()))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{MirrorError, Result};
pub use types::{ContentHash, ItemId};
