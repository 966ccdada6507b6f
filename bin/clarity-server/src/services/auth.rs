//! Bearer-token verification against the hosted auth platform.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::Config;
use crate::entities::Profile;
use crate::error::ServerError;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// The verified caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub user_metadata: Value,
}

impl AuthUser {
    /// A string field of `user_metadata`, e.g. `full_name`.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication service not configured")]
    NotConfigured,
    #[error("invalid authentication token")]
    InvalidToken,
    #[error("auth platform unreachable: {0}")]
    Platform(#[from] reqwest::Error),
}

impl From<AuthError> for ServerError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotConfigured => ServerError::ServiceUnavailable("Authentication service not available".into()),
            AuthError::InvalidToken => ServerError::Unauthorized("Invalid authentication token".into()),
            AuthError::Platform(e) => {
                tracing::error!(error = %e, "token verification failed");
                ServerError::Unauthorized("Invalid authentication token".into())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlatformUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    base_url: Option<String>,
    anon_key: Option<String>,
    service_key: Option<String>,
}

impl AuthClient {
    pub fn new(base_url: Option<String>, anon_key: Option<String>, service_key: Option<String>) -> Self {
        let http = Client::builder().timeout(AUTH_TIMEOUT).build().unwrap_or_default();
        Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            anon_key,
            service_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
            config.supabase_service_role_key.clone(),
        )
    }

    /// Not configured: no platform URL or no key to call it with.
    pub fn disabled() -> Self {
        Self::new(None, None, None)
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.anon_key.as_deref().or(self.service_key.as_deref())
    }

    /// Resolves `token` to a user with `GET /auth/v1/user`.
    pub async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let (Some(base), Some(key)) = (self.base_url.as_deref(), self.api_key()) else {
            return Err(AuthError::NotConfigured);
        };
        let res = self
            .http
            .get(format!("{base}/auth/v1/user"))
            .bearer_auth(token)
            .header("apikey", key)
            .send()
            .await?;
        if !res.status().is_success() {
            tracing::debug!(status = res.status().as_u16(), "token rejected by auth platform");
            return Err(AuthError::InvalidToken);
        }
        let user: PlatformUser = res.json().await.map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            user_metadata: user.user_metadata,
        })
    }

    /// Copies a new profile row to the platform's `profiles` table. Best
    /// effort: failures are logged and reported as `false`.
    pub async fn mirror_profile(&self, profile: &Profile) -> bool {
        let (Some(base), Some(key)) = (self.base_url.as_deref(), self.service_key.as_deref()) else {
            return false;
        };
        let body = json!({
            "user_id": profile.user_id,
            "email": profile.email,
            "full_name": profile.full_name,
            "avatar_url": profile.avatar_url.clone().unwrap_or_default(),
        });
        let result = self
            .http
            .post(format!("{base}/rest/v1/profiles"))
            .bearer_auth(key)
            .header("apikey", key)
            .header("Prefer", "resolution=merge-duplicates")
            .json(&body)
            .send()
            .await;
        match result {
            Ok(res) if res.status().is_success() => true,
            Ok(res) => {
                tracing::warn!(user_id = %profile.user_id, status = res.status().as_u16(), "profile mirror rejected");
                false
            }
            Err(e) => {
                tracing::warn!(user_id = %profile.user_id, error = %e, "profile mirror failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use mockito::Matcher;

    use super::*;

    #[tokio::test]
    async fn verify_maps_platform_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("Authorization", "Bearer tok")
            .match_header("apikey", "anon")
            .with_status(200)
            .with_body(r#"{"id":"u-1","email":"a@example.com","user_metadata":{"full_name":"Alice"}}"#)
            .create_async()
            .await;

        let client = AuthClient::new(Some(format!("{}/", server.url())), Some("anon".into()), None);
        let user = client.verify("tok").await.unwrap();
        assert_eq!(user.user_id, "u-1");
        assert_eq!(user.email, "a@example.com");
        assert_eq!(user.metadata_str("full_name"), Some("Alice"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_token_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"msg":"invalid JWT"}"#)
            .create_async()
            .await;

        let client = AuthClient::new(Some(server.url()), Some("anon".into()), None);
        assert!(matches!(client.verify("bad").await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let client = AuthClient::disabled();
        assert!(!client.is_configured());
        assert!(matches!(client.verify("tok").await, Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn mirror_needs_service_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/profiles")
            .match_header("apikey", "service")
            .match_body(Matcher::PartialJson(json!({ "user_id": "u-1" })))
            .with_status(201)
            .create_async()
            .await;

        let profile = Profile {
            user_id: "u-1".into(),
            email: "a@example.com".into(),
            full_name: "Alice".into(),
            avatar_url: None,
            preferences: Default::default(),
            therapy_goals: vec![],
            created_at: chrono::Utc::now(),
            updated_at: None,
        };
        let anon_only = AuthClient::new(Some(server.url()), Some("anon".into()), None);
        assert!(!anon_only.mirror_profile(&profile).await);

        let client = AuthClient::new(Some(server.url()), Some("anon".into()), Some("service".into()));
        assert!(client.mirror_profile(&profile).await);
        mock.assert_async().await;
    }
}
