//! REST calls against `/api/v1`.

use std::time::Duration;

use clarity_types::{ChatRequest, ChatResponse, ErrorBody, HealthCheck, SessionHistory, TopicInfo};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("clarity-client/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Bearer token of the signed-in user, sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let req = self.authed(self.client.post(self.url("/chat")).json(request));
        decode(req.send().await?).await
    }

    pub async fn history(&self, session_id: &str) -> Result<SessionHistory> {
        let req = self.authed(self.client.get(self.url(&format!("/session/{session_id}/history"))));
        decode(req.send().await?).await
    }

    pub async fn topics(&self) -> Result<Vec<TopicInfo>> {
        let req = self.authed(self.client.get(self.url("/topics")));
        decode(req.send().await?).await
    }

    pub async fn health(&self) -> Result<HealthCheck> {
        let req = self.authed(self.client.get(self.url("/health")));
        decode(req.send().await?).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let req = self.authed(self.client.delete(self.url(&format!("/session/{session_id}"))));
        let _: serde_json::Value = decode(req.send().await?).await?;
        Ok(())
    }
}

/// Decodes a 2xx JSON body, or turns the `detail` of an error body into
/// [`ClientError::Api`].
async fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
    let status = res.status();
    let bytes = res.bytes().await?;
    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorBody>(&bytes)
            .map(|b| b.detail)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        return Err(ClientError::Api {
            status: status.as_u16(),
            detail,
        });
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod test {
    use mockito::Matcher;

    use super::*;

    #[tokio::test]
    async fn send_message_posts_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat")
            .match_header("Authorization", "Bearer tok")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "content": "hello",
                "session_id": "s-1"
            })))
            .with_status(200)
            .with_body(
                r#"{"content":"hi","session_id":"s-1","timestamp":"2024-01-01T00:00:00Z","confidence_score":0.5,"suggestions":[]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(format!("{}/", server.url())).with_token("tok");
        let resp = client.send_message(&ChatRequest::new("s-1", "hello")).await.unwrap();
        assert_eq!(resp.content, "hi");
        assert_eq!(resp.confidence_score, 0.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_detail_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/session/s-9/history")
            .with_status(403)
            .with_body(r#"{"detail":"Access denied"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        match client.history("s-9").await {
            Err(ClientError::Api { status, detail }) => {
                assert_eq!(status, 403);
                assert_eq!(detail, "Access denied");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_keeps_body_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/topics")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        match client.topics().await {
            Err(ClientError::Api { status, detail }) => {
                assert_eq!(status, 502);
                assert_eq!(detail, "bad gateway");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_session_ignores_body_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/v1/session/s-1")
            .with_status(200)
            .with_body(r#"{"message":"Session s-1 deleted successfully"}"#)
            .create_async()
            .await;

        ApiClient::new(server.url()).delete_session("s-1").await.unwrap();
        mock.assert_async().await;
    }
}
