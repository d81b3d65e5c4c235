//! Export record classifier
//!
//! Splits a catalog export into items that still need fingerprinting and
//! deleted identifiers that need an alternate URL from the metadata API.
//!
//! # File Format
//!
//! Comma separated with a header row, 29 columns:
//! `id,uploader_id,created_at,md5,source,rating,image_width,image_height,
//! tag_string,locked_tags,fav_count,file_ext,parent_id,change_seq,approver_id,
//! file_size,comment_count,description,duration,updated_at,is_deleted,...`
//!
//! Only `id`, `md5`, `file_ext` and `is_deleted` are read. Descriptions are
//! free text and can hold quotes, commas and newlines, so quoted fields are
//! handled by the `csv` crate rather than by splitting lines.

use crate::error::Result;
use crate::models::{ActiveItem, ParsedInfo};
use csv::{ByteRecord, ReaderBuilder};
use mirror_common::{ContentHash, ItemId};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// File extensions that decode to something fingerprintable
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "gif", "webm", "mp4"];

pub mod columns {
    pub const ID: usize = 0;
    pub const MD5: usize = 3;
    pub const FILE_EXT: usize = 11;
    pub const IS_DELETED: usize = 20;
}

/// Value of `is_deleted` for deleted rows
const DELETED_FLAG: &str = "t";

/// The fields of one export row the classifier cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub id: ItemId,
    pub md5: String,
    pub file_ext: String,
    pub is_deleted: bool,
}

#[derive(Debug, Error)]
pub enum MalformedRow {
    #[error("expected at least {expected} columns, got {got}")]
    TooFewColumns { expected: usize, got: usize },

    #[error("column {0} is not valid UTF-8")]
    NotUtf8(usize),

    #[error(transparent)]
    InvalidValue(#[from] mirror_common::MirrorError),
}

impl ExportRecord {
    pub fn from_row(row: &ByteRecord) -> std::result::Result<Self, MalformedRow> {
        if row.len() <= columns::IS_DELETED {
            return Err(MalformedRow::TooFewColumns {
                expected: columns::IS_DELETED + 1,
                got: row.len(),
            });
        }

        Ok(Self {
            id: ItemId::parse(field(row, columns::ID)?.trim())?,
            md5: field(row, columns::MD5)?.trim().to_string(),
            file_ext: field(row, columns::FILE_EXT)?.trim().to_ascii_lowercase(),
            is_deleted: field(row, columns::IS_DELETED)?.trim() == DELETED_FLAG,
        })
    }
}

fn field(row: &ByteRecord, index: usize) -> std::result::Result<&str, MalformedRow> {
    let raw = row.get(index).unwrap_or_default();
    std::str::from_utf8(raw).map_err(|_| MalformedRow::NotUtf8(index))
}

/// Applies the resume, extension and deletion rules to every export row
#[derive(Debug, Clone)]
pub struct Classifier {
    static_base_url: String,
    extensions: HashSet<String>,
}

impl Classifier {
    pub fn new(static_base_url: impl Into<String>) -> Self {
        Self {
            static_base_url: static_base_url.into(),
            extensions: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the supported extension set
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|s| s.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Classify an uncompressed export on disk
    ///
    /// Blocking; run it on the blocking pool for real exports.
    pub fn classify_path(&self, path: &Path, processed: &HashSet<ItemId>) -> Result<ParsedInfo> {
        info!("Parsing export {}", path.display());
        let file = std::fs::File::open(path)?;
        self.classify_reader(std::io::BufReader::new(file), processed)
    }

    /// Classify export rows from any reader
    ///
    /// Rows whose identifier is in `processed` are skipped before any other
    /// rule applies. Malformed rows are skipped and counted; read errors are
    /// returned.
    pub fn classify_reader<R: Read>(
        &self,
        reader: R,
        processed: &HashSet<ItemId>,
    ) -> Result<ParsedInfo> {
        let mut export = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut info = ParsedInfo::default();
        let mut row = ByteRecord::new();

        loop {
            match export.read_byte_record(&mut row) {
                Ok(true) => {},
                Ok(false) => break,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    info.stats.rows += 1;
                    info.stats.malformed += 1;
                    warn!("Skipping unreadable export row {}: {}", info.stats.rows, e);
                    continue;
                },
            }
            info.stats.rows += 1;

            let record = match ExportRecord::from_row(&row) {
                Ok(record) => record,
                Err(e) => {
                    info.stats.malformed += 1;
                    warn!("Skipping malformed export row {}: {}", info.stats.rows, e);
                    continue;
                },
            };

            if processed.contains(&record.id) {
                info.stats.already_processed += 1;
                continue;
            }

            if !self.extensions.contains(&record.file_ext) {
                info.stats.unsupported += 1;
                continue;
            }

            if info.contains(&record.id) {
                info.stats.duplicates += 1;
                debug!(item_id = %record.id, "Duplicate export row ignored");
                continue;
            }

            if record.is_deleted {
                info.deleted.insert(record.id);
                continue;
            }

            let hash = match ContentHash::parse(record.md5) {
                Ok(hash) => hash,
                Err(e) => {
                    info.stats.malformed += 1;
                    warn!("Skipping malformed export row {}: {}", info.stats.rows, e);
                    continue;
                },
            };

            let item = ActiveItem::new(record.id, hash, &self.static_base_url);
            info.active.insert(item.id.clone(), item);
        }

        info!(
            "Parsed {} export rows: {} active, {} deleted, {} already processed, {} unsupported, {} malformed",
            info.stats.rows,
            info.active.len(),
            info.deleted.len(),
            info.stats.already_processed,
            info.stats.unsupported,
            info.stats.malformed
        );

        Ok(info)
    }
}
