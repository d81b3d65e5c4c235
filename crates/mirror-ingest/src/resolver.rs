//! Deleted-item resolution against the metadata API
//!
//! Deleted posts no longer have a file on the static host, but the metadata
//! API still reports a preview URL for them when queried with `status:any`.
//! Queries are capped at [`MAX_RESOLVE_BATCH_SIZE`] identifiers.

use crate::config::{Credentials, IngestConfig, MAX_RESOLVE_BATCH_SIZE};
use crate::error::{IngestError, Result};
use crate::models::ResolvedDeletedItem;
use mirror_common::{ContentHash, ItemId};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    #[serde(default)]
    file: PostFile,
    #[serde(default)]
    preview: PostPreview,
}

#[derive(Debug, Default, Deserialize)]
struct PostFile {
    md5: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PostPreview {
    url: Option<String>,
}

pub struct DeletedItemResolver {
    client: Client,
    api_base_url: String,
    credentials: Credentials,
    batch_size: usize,
}

impl DeletedItemResolver {
    pub fn new(client: Client, api_base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            credentials,
            batch_size: MAX_RESOLVE_BATCH_SIZE,
        }
    }

    /// `None` when the configuration carries no credentials
    pub fn from_config(client: Client, config: &IngestConfig) -> Option<Self> {
        let credentials = config.credentials.clone()?;
        Some(
            Self::new(client, config.api_base_url.clone(), credentials)
                .with_batch_size(config.resolve_batch_size),
        )
    }

    /// Clamped to `1..=MAX_RESOLVE_BATCH_SIZE`
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_RESOLVE_BATCH_SIZE);
        self
    }

    /// Look up alternate URLs for every identifier, one query per batch
    ///
    /// Batches run sequentially and the first failing batch fails the call.
    /// Identifiers the API does not return are simply absent from the result.
    pub async fn resolve(
        &self,
        ids: &HashSet<ItemId>,
    ) -> Result<HashMap<ItemId, ResolvedDeletedItem>> {
        let mut sorted: Vec<&ItemId> = ids.iter().collect();
        sorted.sort_unstable();

        let batches = sorted.chunks(self.batch_size);
        let batch_count = batches.len();
        info!("Resolving {} deleted items in {} batches", ids.len(), batch_count);

        let mut resolved = HashMap::with_capacity(ids.len());
        for (index, batch) in batches.enumerate() {
            debug!("Querying deleted item batch {}/{}", index + 1, batch_count);
            for item in self.query_batch(batch).await? {
                if !ids.contains(&item.id) {
                    debug!(item_id = %item.id, "Ignoring post that was not requested");
                    continue;
                }
                resolved.entry(item.id.clone()).or_insert(item);
            }
        }

        info!("Resolved {}/{} deleted items", resolved.len(), ids.len());
        Ok(resolved)
    }

    async fn query_batch(&self, batch: &[&ItemId]) -> Result<Vec<ResolvedDeletedItem>> {
        let url = format!("{}/posts.json", self.api_base_url.trim_end_matches('/'));
        let id_list = batch.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(",");
        let tags = format!("id:{} status:any", id_list);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.api_key))
            .query(&[("tags", tags), ("limit", batch.len().to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status { url, status });
        }

        let body = response.bytes().await?;
        let parsed: PostsResponse = serde_json::from_slice(&body)?;

        Ok(parsed.posts.into_iter().filter_map(into_resolved).collect())
    }
}

fn into_resolved(post: Post) -> Option<ResolvedDeletedItem> {
    let id = match ItemId::parse(post.id.to_string()) {
        Ok(id) => id,
        Err(e) => {
            warn!("Skipping post with unusable id: {}", e);
            return None;
        },
    };

    let Some(url) = post.preview.url.filter(|url| !url.is_empty()) else {
        warn!(item_id = %id, "Deleted item has no preview URL");
        return None;
    };

    let hash = match post.file.md5.map(ContentHash::parse) {
        Some(Ok(hash)) => hash,
        Some(Err(e)) => {
            warn!(item_id = %id, "Deleted item has an invalid md5: {}", e);
            return None;
        },
        None => {
            warn!(item_id = %id, "Deleted item has no md5");
            return None;
        },
    };

    Some(ResolvedDeletedItem { id, hash, url })
}
