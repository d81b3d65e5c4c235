//! Data model of one ingest run

use mirror_common::{ContentHash, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A live catalog entry whose preview is fetched from the static host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveItem {
    pub id: ItemId,
    pub hash: ContentHash,
    pub url: String,
}

impl ActiveItem {
    /// Build an item whose URL is derived from its content hash
    pub fn new(id: ItemId, hash: ContentHash, static_base_url: &str) -> Self {
        let url = preview_url(static_base_url, &hash);
        Self { id, hash, url }
    }
}

/// A deleted catalog entry with an alternate URL from the metadata API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeletedItem {
    pub id: ItemId,
    pub hash: ContentHash,
    pub url: String,
}

/// Anything a worker can process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Active(ActiveItem),
    Deleted(ResolvedDeletedItem),
}

impl Item {
    pub fn id(&self) -> &ItemId {
        match self {
            Item::Active(item) => &item.id,
            Item::Deleted(item) => &item.id,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Item::Active(item) => &item.url,
            Item::Deleted(item) => &item.url,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Active(_) => ItemKind::Active,
            Item::Deleted(_) => ItemKind::Deleted,
        }
    }
}

impl From<ActiveItem> for Item {
    fn from(item: ActiveItem) -> Self {
        Item::Active(item)
    }
}

impl From<ResolvedDeletedItem> for Item {
    fn from(item: ResolvedDeletedItem) -> Self {
        Item::Deleted(item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Active,
    Deleted,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Active => write!(f, "active"),
            ItemKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// Row counters collected while classifying an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub rows: usize,
    pub already_processed: usize,
    pub unsupported: usize,
    pub malformed: usize,
    pub duplicates: usize,
}

/// Classifier output for one run
#[derive(Debug, Default)]
pub struct ParsedInfo {
    pub active: HashMap<ItemId, ActiveItem>,
    pub deleted: HashSet<ItemId>,
    pub stats: ParseStats,
}

impl ParsedInfo {
    /// True when the identifier is already in either set
    pub fn contains(&self, id: &ItemId) -> bool {
        self.active.contains_key(id) || self.deleted.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.deleted.is_empty()
    }
}

/// Preview location on a content host sharded by hash
pub fn preview_url(static_base_url: &str, hash: &ContentHash) -> String {
    format!(
        "{}/data/preview/{}.jpg",
        static_base_url.trim_end_matches('/'),
        hash.shard_path()
    )
}

/// Per-channel samples of a resized image, row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub r: Vec<u8>,
    pub g: Vec<u8>,
    pub b: Vec<u8>,
}

impl Fingerprint {
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            r: Vec::with_capacity(samples),
            g: Vec::with_capacity(samples),
            b: Vec::with_capacity(samples),
        }
    }

    pub fn push(&mut self, r: u8, g: u8, b: u8) {
        self.r.push(r);
        self.g.push(g);
        self.b.push(b);
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Body accepted by the index's image endpoint
    pub fn envelope(&self) -> FingerprintEnvelope<'_> {
        FingerprintEnvelope { channels: self }
    }
}

/// `{"channels": {"r": [...], "g": [...], "b": [...]}}`
#[derive(Debug, Serialize)]
pub struct FingerprintEnvelope<'a> {
    pub channels: &'a Fingerprint,
}
