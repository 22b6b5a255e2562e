//! Identity Toolkit REST client.
//!
//! Tokens are verified with `accounts:lookup` using the public API key;
//! accounts are deleted with the project-scoped `accounts:delete` admin call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use lovejournal_core::defaults::HTTP_TIMEOUT_SECS;
use lovejournal_core::{DeleteOutcome, Error, IdentityProvider, Result};

/// Default API endpoint.
pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Public web API key used for token lookups.
    pub api_key: String,
    pub project_id: String,
    /// OAuth2 access token for admin calls.
    pub admin_token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl IdentityConfig {
    pub fn new(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        admin_token: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            admin_token: admin_token.into(),
            base_url: DEFAULT_IDENTITY_BASE_URL.to_string(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }

    /// Load from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `IDENTITY_API_KEY` | required | Web API key |
    /// | `IDENTITY_PROJECT_ID` | required | Project owning the accounts |
    /// | `IDENTITY_ADMIN_TOKEN` | required | Bearer token for account deletion |
    /// | `IDENTITY_BASE_URL` | `https://identitytoolkit.googleapis.com` | API endpoint |
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{name} is not set")))
        };

        let mut config = Self::new(
            required("IDENTITY_API_KEY")?,
            required("IDENTITY_PROJECT_ID")?,
            required("IDENTITY_ADMIN_TOKEN")?,
        );
        if let Ok(base) = std::env::var("IDENTITY_BASE_URL") {
            config.base_url = base;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Read the provider's error code (`INVALID_ID_TOKEN`, `USER_NOT_FOUND`, ...)
/// from a failed response, falling back to the raw body.
async fn error_code(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}

/// HTTP client implementing [`IdentityProvider`].
pub struct HttpIdentityProvider {
    client: Client,
    config: IdentityConfig,
}

impl HttpIdentityProvider {
    pub fn new(config: IdentityConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(IdentityConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("accounts:lookup"))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| Error::Identity(format!("token lookup failed: {e}")))?;

        if response.status().is_client_error() {
            return Err(Error::Unauthorized(error_code(response).await));
        }
        if !response.status().is_success() {
            return Err(Error::Identity(error_code(response).await));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("invalid lookup response: {e}")))?;

        match body.users.into_iter().next() {
            Some(user) if user.disabled => {
                Err(Error::Unauthorized("account is disabled".to_string()))
            }
            Some(user) => Ok(user.local_id),
            None => Err(Error::Unauthorized("token matches no account".to_string())),
        }
    }

    #[instrument(skip(self), fields(subsystem = "media", component = "identity", op = "delete"))]
    async fn delete_identity(&self, uid: &str) -> Result<DeleteOutcome> {
        let path = format!("projects/{}/accounts:delete", self.config.project_id);
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.config.admin_token)
            .json(&json!({ "localId": uid }))
            .send()
            .await
            .map_err(|e| Error::Identity(format!("delete {uid}: request failed: {e}")))?;

        if response.status().is_success() {
            debug!(uid, "Identity deleted");
            return Ok(DeleteOutcome::Deleted);
        }

        let code = error_code(response).await;
        if code.starts_with("USER_NOT_FOUND") {
            debug!(uid, "Identity already gone");
            return Ok(DeleteOutcome::NotFound);
        }
        Err(Error::Identity(format!("delete {uid}: {code}")))
    }
}
