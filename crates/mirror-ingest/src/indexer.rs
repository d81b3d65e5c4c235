//! Client for the external similarity index

use crate::error::Result;
use crate::models::Fingerprint;
use mirror_common::ItemId;
use reqwest::{Client, StatusCode};

/// How the index answered a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Non-2xx answer; the response body is ignored
    Rejected(StatusCode),
}

#[derive(Debug, Clone)]
pub struct IndexClient {
    client: Client,
    base_url: String,
}

impl IndexClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn image_url(&self, id: &ItemId) -> String {
        format!("{}/images/{}", self.base_url, id)
    }

    /// `POST <base>/images/<id>` with the fingerprint envelope
    ///
    /// Only transport failures are errors; a rejection is reported as
    /// [`Submission::Rejected`].
    pub async fn submit(&self, id: &ItemId, fingerprint: &Fingerprint) -> Result<Submission> {
        let response = self
            .client
            .post(self.image_url(id))
            .json(&fingerprint.envelope())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(Submission::Accepted)
        } else {
            Ok(Submission::Rejected(status))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fingerprint() -> Fingerprint {
        let mut fp = Fingerprint::with_capacity(1);
        fp.push(1, 2, 3);
        fp
    }

    #[test]
    fn test_image_url_strips_trailing_slash() {
        let index = IndexClient::new(Client::new(), "http://index:5588/");
        assert_eq!(
            index.image_url(&ItemId::parse("42").unwrap()),
            "http://index:5588/images/42"
        );
    }

    #[tokio::test]
    async fn test_submit_accepted_and_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/1"))
            .and(body_json(serde_json::json!({"channels": {"r": [1], "g": [2], "b": [3]}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/images/2"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let index = IndexClient::new(Client::new(), server.uri());
        let fp = fingerprint();

        let accepted = index.submit(&ItemId::parse("1").unwrap(), &fp).await.unwrap();
        assert_eq!(accepted, Submission::Accepted);

        let rejected = index.submit(&ItemId::parse("2").unwrap(), &fp).await.unwrap();
        assert_eq!(rejected, Submission::Rejected(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
