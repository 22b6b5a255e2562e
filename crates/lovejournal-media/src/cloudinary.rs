//! Cloudinary image store client.
//!
//! Deletion goes through the signed upload API (`image/destroy`); listing
//! goes through the Admin API (`resources/image/upload`) with basic auth.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use lovejournal_core::defaults::{HTTP_TIMEOUT_SECS, IMAGE_LIST_PAGE_SIZE, IMAGE_ROOT_FOLDER};
use lovejournal_core::{DeleteOutcome, Error, ImageStore, ResourcePage, Result, StoredImage};

/// Default API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Credentials and addressing for one Cloudinary cloud.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder under which every user's images live (`<root>/<uid>/...`).
    pub root_folder: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            root_folder: IMAGE_ROOT_FOLDER.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }

    /// Load from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CLOUDINARY_CLOUD_NAME` | required | Cloud name |
    /// | `CLOUDINARY_API_KEY` | required | API key |
    /// | `CLOUDINARY_API_SECRET` | required | API secret used for signing |
    /// | `CLOUDINARY_ROOT_FOLDER` | `love-journal` | Per-user folder root |
    /// | `CLOUDINARY_API_BASE` | `https://api.cloudinary.com/v1_1` | API endpoint |
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{name} is not set")))
        };

        let mut config = Self::new(
            required("CLOUDINARY_CLOUD_NAME")?,
            required("CLOUDINARY_API_KEY")?,
            required("CLOUDINARY_API_SECRET")?,
        );
        if let Ok(root) = std::env::var("CLOUDINARY_ROOT_FOLDER") {
            config.root_folder = root.trim_matches('/').to_string();
        }
        if let Ok(base) = std::env::var("CLOUDINARY_API_BASE") {
            config.api_base = base;
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_root_folder(mut self, root_folder: impl Into<String>) -> Self {
        self.root_folder = root_folder.into();
        self
    }
}

/// Compute the request signature: parameters sorted by name, joined as
/// `k=v&k=v`, followed by the API secret, SHA-256 hex encoded.
///
/// The account must be configured for SHA-256 signatures.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<ResourceJson>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceJson {
    public_id: String,
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    context: Option<ContextJson>,
}

#[derive(Debug, Deserialize)]
struct ContextJson {
    #[serde(default)]
    custom: BTreeMap<String, String>,
}

impl From<ResourceJson> for StoredImage {
    fn from(r: ResourceJson) -> Self {
        StoredImage {
            url: r.secure_url.or(r.url).unwrap_or_default(),
            public_id: r.public_id,
            created_at: r.created_at,
            context: r.context.map(|c| c.custom).unwrap_or_default(),
        }
    }
}

/// Cloudinary REST client implementing [`ImageStore`].
pub struct CloudinaryClient {
    client: Client,
    config: CloudinaryConfig,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(CloudinaryConfig::from_env()?)
    }

    pub fn root_folder(&self) -> &str {
        &self.config.root_folder
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            path
        )
    }
}

#[async_trait]
impl ImageStore for CloudinaryClient {
    #[instrument(skip(self), fields(subsystem = "media", component = "cloudinary", op = "destroy"))]
    async fn destroy(&self, public_id: &str) -> Result<DeleteOutcome> {
        let start = Instant::now();
        let timestamp = Utc::now().timestamp().to_string();

        let mut params = BTreeMap::new();
        params.insert("invalidate", "true".to_string());
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", timestamp);
        let signature = sign_params(&params, &self.config.api_secret);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));

        let response = self
            .client
            .post(self.endpoint("image/destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::ImageStore(format!("destroy {public_id}: request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ImageStore(format!(
                "destroy {public_id}: HTTP {status}: {body}"
            )));
        }

        let body: DestroyResponse = response.json().await.map_err(|e| {
            Error::ImageStore(format!("destroy {public_id}: invalid response: {e}"))
        })?;

        let outcome = match body.result.as_str() {
            "ok" => DeleteOutcome::Deleted,
            "not found" => DeleteOutcome::NotFound,
            other => {
                return Err(Error::ImageStore(format!(
                    "destroy {public_id}: unexpected result {other:?}"
                )))
            }
        };

        debug!(
            public_id,
            outcome = ?outcome,
            duration_ms = start.elapsed().as_millis() as u64,
            "Image destroyed"
        );
        Ok(outcome)
    }

    #[instrument(skip(self), fields(subsystem = "media", component = "cloudinary", op = "list"))]
    async fn list_by_prefix(&self, prefix: &str, cursor: Option<&str>) -> Result<ResourcePage> {
        let mut query: Vec<(&str, String)> = vec![
            ("prefix", prefix.to_string()),
            ("max_results", IMAGE_LIST_PAGE_SIZE.to_string()),
            ("context", "true".to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("next_cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint("resources/image/upload"))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::ImageStore(format!("list {prefix}: request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(prefix, %status, "Image listing failed");
            return Err(Error::ImageStore(format!(
                "list {prefix}: HTTP {status}: {body}"
            )));
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| Error::ImageStore(format!("list {prefix}: invalid response: {e}")))?;

        Ok(ResourcePage {
            resources: body.resources.into_iter().map(StoredImage::from).collect(),
            next_cursor: body.next_cursor.filter(|c| !c.is_empty()),
        })
    }
}
