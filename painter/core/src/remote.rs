//! Remote canvas access
//!
//! [`RemoteCanvas`] abstracts the two request/response operations the painter
//! needs from the shared canvas service. [`HttpCanvasClient`] is the real
//! implementation; tests substitute in-memory fakes.
//!
//! # Endpoints
//!
//! ```text
//! GET  {base}/current              -> PNG, version in X-Content-Version
//! POST {base}/edit?x=..&y=..&c=..  -> 200 ok, 403 rate limited
//! ```

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PainterError, PainterResult};
use crate::reconcile::Pixel;

/// Response header carrying the snapshot version
pub const VERSION_HEADER: &str = "X-Content-Version";

/// A full canvas fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// Version the image corresponds to, when the remote reported one
    pub version: Option<u32>,
}

impl Snapshot {
    /// Decode the image into RGBA samples
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the bytes are not a decodable image.
    pub fn decode(&self) -> PainterResult<RgbaImage> {
        Ok(image::load_from_memory(&self.bytes)?.to_rgba8())
    }
}

/// Operations against the shared canvas service
#[async_trait]
pub trait RemoteCanvas: Send + Sync {
    /// Fetch the whole canvas
    async fn fetch_snapshot(&self) -> PainterResult<Snapshot>;

    /// Paint one pixel
    ///
    /// Rate-limit rejections must surface as `PainterError::RateLimited` so
    /// the scheduler keeps their cost.
    async fn write_pixel(&self, pixel: Pixel) -> PainterResult<()>;
}

// =============================================================================
// HTTP client
// =============================================================================

/// HTTP client settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://josephg.com/sp`
    pub base_url: String,

    /// User-Agent header for every request
    pub user_agent: String,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://josephg.com/sp".to_string(),
            user_agent: crate::DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RemoteConfig {
    /// Create settings for `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the User-Agent
    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// [`RemoteCanvas`] over HTTP
#[derive(Clone, Debug)]
pub struct HttpCanvasClient {
    config: RemoteConfig,
    http_client: reqwest::Client,
}

impl HttpCanvasClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Transport` if the HTTP client cannot be built.
    pub fn new(config: RemoteConfig) -> PainterResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Client settings
    #[must_use]
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteCanvas for HttpCanvasClient {
    async fn fetch_snapshot(&self) -> PainterResult<Snapshot> {
        let url = self.config.endpoint("current");
        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PainterError::Transport(format!(
                "Snapshot fetch returned {status}: {body}"
            )));
        }

        let version = match response.headers().get(VERSION_HEADER) {
            None => None,
            Some(raw) => {
                let parsed = raw.to_str().ok().and_then(|s| s.trim().parse::<u32>().ok());
                if parsed.is_none() {
                    return Err(PainterError::Format(format!(
                        "Unparseable {VERSION_HEADER} header: {raw:?}"
                    )));
                }
                parsed
            }
        };
        let bytes = response.bytes().await?.to_vec();
        debug!(bytes = bytes.len(), version = ?version, "Fetched snapshot");

        Ok(Snapshot { bytes, version })
    }

    async fn write_pixel(&self, pixel: Pixel) -> PainterResult<()> {
        let index = pixel
            .color
            .index()
            .ok_or_else(|| PainterError::Format(format!("{} is not a palette color", pixel.color)))?;

        let url = self.config.endpoint("edit");
        let response = self
            .http_client
            .post(&url)
            .query(&[
                ("x", u32::from(pixel.x)),
                ("y", u32::from(pixel.y)),
                ("c", u32::from(index)),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::FORBIDDEN => Err(PainterError::RateLimited { status: 403 }),
            status => {
                let reason = response.text().await.unwrap_or_default();
                Err(PainterError::RejectedOther {
                    status: Some(status.as_u16()),
                    reason,
                })
            }
        }
    }
}
