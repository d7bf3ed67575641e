//! Rehosting on an anonymous file host
//!
//! The asset is uploaded with a single `PUT <host>/<file name>`; the host
//! answers with the public link as plain text (transfer.sh protocol).

use super::{MediaAsset, RehostedLink};
use crate::config::{RetryPolicy, Settings};
use crate::utils::{
    create_http_client, is_transient_status, retry_operation, truncate_str, LOGGED_BODY_LIMIT,
};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client as HttpClient, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Errors produced while publishing an asset
#[derive(Debug, Error)]
pub enum PublishError {
    /// The host rejected the upload, returned no link, or could not be reached
    #[error("upload failed: {reason}")]
    UploadFailed {
        /// Response status, `None` for network failures
        status: Option<StatusCode>,
        /// Human-readable cause for logs
        reason: String,
    },
    /// The temporary media file could not be opened
    #[error("asset unreadable: {0}")]
    AssetUnreadable(String),
}

impl PublishError {
    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UploadFailed { status: None, .. } => true,
            Self::UploadFailed {
                status: Some(status),
                ..
            } => is_transient_status(*status),
            Self::AssetUnreadable(_) => false,
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        let reason = if e.is_timeout() {
            format!("timed out: {e}")
        } else {
            e.to_string()
        };
        Self::UploadFailed {
            status: None,
            reason,
        }
    }
}

/// Publishes a fetched asset at a public URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Rehoster: Send + Sync {
    /// Upload `asset` and return its public link
    ///
    /// The asset stays owned by the caller, which removes it afterwards.
    async fn publish(&self, asset: &MediaAsset) -> Result<RehostedLink, PublishError>;
}

/// [`Rehoster`] for transfer.sh-compatible hosts
pub struct AnonymousFileHost {
    client: HttpClient,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl AnonymousFileHost {
    /// Create a host client from application settings
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: create_http_client(settings.http_timeout(), &settings.user_agent),
            endpoint: settings.file_host_url.trim_end_matches('/').to_string(),
            timeout: settings.transfer_timeout(),
            retry: settings.publish_retry(),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn upload_url(&self, asset: &MediaAsset) -> String {
        format!("{}/{}", self.endpoint, asset.file_name())
    }

    async fn upload(&self, url: &str, asset: &MediaAsset) -> Result<RehostedLink, PublishError> {
        // Reopened per attempt so a retry starts from the first byte
        let file = tokio::fs::File::open(asset.path())
            .await
            .map_err(|e| PublishError::AssetUnreadable(e.to_string()))?;

        let response = self
            .client
            .put(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, asset.size())
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PublishError::UploadFailed {
                status: Some(status),
                reason: format!("HTTP {status}: {}", truncate_str(body.trim(), LOGGED_BODY_LIMIT)),
            });
        }

        let link = body.trim();
        if !(link.starts_with("https://") || link.starts_with("http://")) {
            return Err(PublishError::UploadFailed {
                status: Some(status),
                reason: format!(
                    "unexpected response instead of a link: {}",
                    truncate_str(link, LOGGED_BODY_LIMIT)
                ),
            });
        }
        Ok(RehostedLink::new(link))
    }
}

#[async_trait]
impl Rehoster for AnonymousFileHost {
    async fn publish(&self, asset: &MediaAsset) -> Result<RehostedLink, PublishError> {
        let url = self.upload_url(asset);
        debug!(url = %url, size = asset.size(), "Uploading media");

        let link = retry_operation(
            "file host upload",
            self.retry,
            || self.upload(&url, asset),
            PublishError::is_transient,
        )
        .await?;

        info!(reel = %asset.source(), link = %link, "Media rehosted");
        Ok(link)
    }
}
