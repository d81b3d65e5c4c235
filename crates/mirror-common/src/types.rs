//! Catalog value types shared across the mirror

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of one catalog item, unique within an export.
///
/// The checkpoint file stores identifiers as a single comma-joined line, so
/// an identifier can never contain a comma or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Validate and wrap a raw identifier
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.contains(',') || raw.chars().any(char::is_whitespace) {
            return Err(MirrorError::InvalidIdentifier(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = MirrorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Hex digest identifying an item's binary content (an md5 in practice).
///
/// Content hosts shard files by the first two nibble-pairs of the hash,
/// so at least four hex characters are required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate and normalize (lower-case) a raw hex digest
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() < 4 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MirrorError::InvalidContentHash(raw));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sharded relative path: `aa/bb/aabb...`
    pub fn shard_path(&self) -> String {
        format!("{}/{}/{}", &self.0[0..2], &self.0[2..4], self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = MirrorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_item_id_rejects_separator_characters() {
        assert!(ItemId::parse("12345").is_ok());
        assert_eq!(
            ItemId::parse("1,2"),
            Err(MirrorError::InvalidIdentifier("1,2".to_string()))
        );
        assert!(ItemId::parse("").is_err());
        assert!(ItemId::parse("12 34").is_err());
        assert!(ItemId::parse("12\n").is_err());
    }

    #[test]
    fn test_item_id_set_lookup_by_str() {
        let ids: HashSet<ItemId> = ["1", "2"].into_iter().map(|s| ItemId::parse(s).unwrap()).collect();
        assert!(ids.contains("1"));
        assert!(!ids.contains("3"));
    }

    #[test]
    fn test_item_id_serde_validates() {
        let id: ItemId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(id.as_str(), "42");
        assert!(serde_json::from_str::<ItemId>("\"4,2\"").is_err());
    }

    #[test]
    fn test_content_hash_shard_path() {
        let hash = ContentHash::parse("D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(hash.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            hash.shard_path(),
            "d4/1d/d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_content_hash_rejects_short_or_non_hex() {
        assert!(ContentHash::parse("abc").is_err());
        assert!(ContentHash::parse("zzzz").is_err());
        assert!(ContentHash::parse("").is_err());
        assert!(ContentHash::parse("abcd").is_ok());
    }
}
