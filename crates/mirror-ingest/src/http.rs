//! HTTP client factory
//!
//! `reqwest::Client` is reference counted internally, so one instance is built
//! per process and cloned into the resolver, the workers and the index client.

use crate::config::IngestConfig;
use crate::error::Result;
use reqwest::Client;

/// Client for metadata queries, content fetches and index submissions
pub fn build_client(config: &IngestConfig) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .user_agent(config.user_agent_header())
        .build()?;
    Ok(client)
}

/// Client for the export archive, which takes far longer than a single
/// request timeout to stream
pub fn build_download_client(config: &IngestConfig) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent_header())
        .build()?;
    Ok(client)
}
