//! Fetch, fingerprint and submit one item

use crate::config::RetryPolicy;
use crate::error::{IngestError, Result};
use crate::fingerprint::fingerprint_bytes;
use crate::indexer::{IndexClient, Submission};
use crate::models::Item;
use mirror_common::ItemId;
use reqwest::Client;
use std::future::Future;
use tracing::{debug, info, warn};

/// Result of one pool task, pushed onto the completion channel
#[derive(Debug)]
pub enum TaskOutcome {
    Success { id: ItemId, submission: Submission },
    Failure { id: ItemId, cause: IngestError },
}

impl TaskOutcome {
    pub fn id(&self) -> &ItemId {
        match self {
            TaskOutcome::Success { id, .. } | TaskOutcome::Failure { id, .. } => id,
        }
    }
}

/// Shared by every pool task; cloning is cheap
#[derive(Debug, Clone)]
pub struct Worker {
    client: Client,
    index: IndexClient,
    retry: RetryPolicy,
}

impl Worker {
    pub fn new(client: Client, index: IndexClient, retry: RetryPolicy) -> Self {
        Self { client, index, retry }
    }

    /// Process an item and wrap the result for the completion channel
    pub async fn run(&self, item: Item) -> TaskOutcome {
        let id = item.id().clone();
        match self.process(&item).await {
            Ok(submission) => TaskOutcome::Success { id, submission },
            Err(cause) => TaskOutcome::Failure { id, cause },
        }
    }

    /// Download the item's image, fingerprint it and submit the fingerprint
    ///
    /// A rejected submission is not an error: the item still counts as
    /// processed.
    pub async fn process(&self, item: &Item) -> Result<Submission> {
        let id = item.id();
        let url = item.url();
        info!(item_id = %id, kind = %item.kind(), url = %url, "Downloading item");

        let bytes = self.with_retry("fetch", id, || self.fetch(url)).await?;

        let fingerprint = tokio::task::spawn_blocking(move || fingerprint_bytes(&bytes)).await??;

        let submission = self
            .with_retry("submit", id, || self.index.submit(id, &fingerprint))
            .await?;

        match submission {
            Submission::Accepted => info!(item_id = %id, "Added item to index"),
            Submission::Rejected(status) => {
                warn!(item_id = %id, status = %status, "Index rejected item")
            },
        }

        Ok(submission)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, id: &ItemId, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        item_id = %id,
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        what,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ActiveItem;
    use image::{DynamicImage, Rgb, RgbImage};
    use mirror_common::ContentHash;
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn item(server: &MockServer) -> Item {
        ActiveItem::new(
            ItemId::parse("1").unwrap(),
            ContentHash::parse("abcdef01").unwrap(),
            &server.uri(),
        )
        .into()
    }

    fn worker(server: &MockServer, retry: RetryPolicy) -> Worker {
        let client = Client::new();
        Worker::new(client.clone(), IndexClient::new(client, server.uri()), retry)
    }

    #[tokio::test]
    async fn test_fetch_error_is_a_failure_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = worker(&server, RetryPolicy::default()).run(item(&server)).await;
        match outcome {
            TaskOutcome::Failure { id, cause } => {
                assert_eq!(id.as_str(), "1");
                assert!(matches!(cause, IngestError::Status { .. }));
            },
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_is_retried_with_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/preview/ab/cd/abcdef01.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/images/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
        };
        let submission = worker(&server, retry).process(&item(&server)).await.unwrap();
        assert_eq!(submission, Submission::Accepted);
    }

    #[tokio::test]
    async fn test_undecodable_content_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = worker(&server, RetryPolicy::default())
            .process(&item(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Image(_)));
    }
}
