//! Reel page scraping and media download
//!
//! The reel page is fetched with a browser `User-Agent`, its Open Graph
//! `og:video` meta tag is located, and the video it points to is streamed
//! into a per-request temporary file.

use super::{MediaAsset, MediaReference};
use crate::config::{RetryPolicy, Settings};
use crate::utils::{create_http_client, is_transient_status, retry_operation};
use async_trait::async_trait;
use futures_util::StreamExt;
use lazy_regex::lazy_regex;
use reqwest::{Client as HttpClient, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

// Quoted attribute values may contain `>`
static RE_META_TAG: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"(?is)<meta\b(?:[^>"']|"[^"]*"|'[^']*')*>"#);
static RE_ATTRIBUTE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"(?is)([a-z_:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#);

/// Open Graph properties naming the page video, in order of preference
const VIDEO_PROPERTIES: &[&str] = &["og:video", "og:video:url", "og:video:secure_url"];

/// Errors produced while retrieving media
#[derive(Debug, Error)]
pub enum FetchError {
    /// The reel page answered with a non-success status
    #[error("page unavailable: HTTP {status}")]
    PageUnavailable {
        /// Response status code
        status: StatusCode,
    },
    /// The page has no usable `og:video` meta tag
    #[error("no og:video tag found on page")]
    NoVideoFound,
    /// The media URL answered with a non-success status
    #[error("media download failed: HTTP {status}")]
    DownloadFailed {
        /// Response status code
        status: StatusCode,
    },
    /// Connection error, timeout or interrupted body
    #[error("network error: {0}")]
    NetworkError(String),
    /// The reel reference is not a valid URL
    #[error("invalid reel URL: {0}")]
    InvalidUrl(String),
    /// Writing the temporary file failed
    #[error("temporary storage error: {0}")]
    Storage(String),
}

impl FetchError {
    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError(_) => true,
            Self::PageUnavailable { status } | Self::DownloadFailed { status } => {
                is_transient_status(*status)
            }
            Self::NoVideoFound | Self::InvalidUrl(_) | Self::Storage(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::NetworkError(format!("timed out: {e}"))
        } else {
            Self::NetworkError(e.to_string())
        }
    }
}

/// Resolves a reel reference to a downloaded media file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Retrieve the video behind `reference` into temporary storage
    async fn fetch(&self, reference: &MediaReference) -> Result<MediaAsset, FetchError>;
}

/// [`MediaFetcher`] scraping the public reel page over HTTP
pub struct HttpMediaFetcher {
    client: HttpClient,
    temp_dir: PathBuf,
    page_timeout: Duration,
    download_timeout: Duration,
    retry: RetryPolicy,
}

impl HttpMediaFetcher {
    /// Create a fetcher from application settings
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: create_http_client(settings.http_timeout(), &settings.user_agent),
            temp_dir: std::env::temp_dir(),
            page_timeout: settings.http_timeout(),
            download_timeout: settings.transfer_timeout(),
            retry: settings.fetch_retry(),
        }
    }

    /// Store downloads under `dir` instead of the system temp directory
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.page_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::PageUnavailable { status });
        }
        Ok(response.text().await?)
    }

    /// Stream `video_url` into `path`, truncating any earlier partial attempt
    async fn download(&self, video_url: &Url, path: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(video_url.clone())
            .timeout(self.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::DownloadFailed { status });
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Storage(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;

        Ok(written)
    }

    /// Unique download target, deleted when dropped
    fn temp_path(&self) -> TempPath {
        TempPath::from_path(self.temp_dir.join(format!("reel-{}.mp4", Uuid::new_v4())))
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, reference: &MediaReference) -> Result<MediaAsset, FetchError> {
        let page_url = Url::parse(&reference.request_url())
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let html = retry_operation(
            "reel page fetch",
            self.retry,
            || self.fetch_page(&page_url),
            FetchError::is_transient,
        )
        .await?;

        let video_url = find_og_video(&html, &page_url).ok_or(FetchError::NoVideoFound)?;
        debug!(reel = %reference, video_url = %video_url, "Found og:video");

        let path = self.temp_path();
        let size = retry_operation(
            "media download",
            self.retry,
            || self.download(&video_url, &path),
            FetchError::is_transient,
        )
        .await?;

        info!(reel = %reference, path = %path.display(), size, "Media downloaded");
        Ok(MediaAsset::new(reference.clone(), path, size))
    }
}

/// Locates the page video announced through Open Graph meta tags
///
/// `og:video` wins over `og:video:url`, which wins over `og:video:secure_url`.
/// Attribute order and quoting style do not matter; HTML entities in the
/// `content` value are decoded and relative URLs resolved against `base`.
#[must_use]
pub fn find_og_video(html: &str, base: &Url) -> Option<Url> {
    let mut candidates: Vec<(usize, String)> = RE_META_TAG
        .find_iter(html)
        .filter_map(|tag| {
            let mut property = None;
            let mut content = None;
            for caps in RE_ATTRIBUTE.captures_iter(tag.as_str()) {
                let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                match caps[1].to_ascii_lowercase().as_str() {
                    "property" | "name" => property = Some(value.trim().to_ascii_lowercase()),
                    "content" => content = Some(value),
                    _ => {}
                }
            }
            let rank = VIDEO_PROPERTIES
                .iter()
                .position(|p| property.as_deref() == Some(*p))?;
            let content = html_escape::decode_html_entities(content?.trim()).into_owned();
            (!content.is_empty()).then_some((rank, content))
        })
        .collect();

    candidates.sort_by_key(|(rank, _)| *rank);
    candidates
        .into_iter()
        .filter_map(|(_, content)| base.join(&content).ok())
        .find(|url| matches!(url.scheme(), "http" | "https"))
}
