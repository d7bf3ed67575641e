//! Media retrieval pipeline
//!
//! Text -> [`MediaReference`] -> [`MediaAsset`] (temporary file) -> [`RehostedLink`].

use std::fmt;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};

/// Reel URL recognition in free-form text
pub mod extract;
/// Page scraping and media download
pub mod fetcher;
/// Upload to the anonymous file host
pub mod rehost;

pub use extract::extract_reel_url;
pub use fetcher::{FetchError, HttpMediaFetcher, MediaFetcher};
pub use rehost::{AnonymousFileHost, PublishError, Rehoster};

/// A reel URL found in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference(String);

impl MediaReference {
    /// Wrap an already validated URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// URL exactly as it appeared in the message
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL suitable for an HTTP request (scheme added when missing)
    #[must_use]
    pub fn request_url(&self) -> String {
        if self.0.starts_with("http://") || self.0.starts_with("https://") {
            self.0.clone()
        } else {
            format!("https://{}", self.0)
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Downloaded media stored in a per-request temporary file
///
/// The file is owned by exactly one request and is deleted when the asset is
/// dropped, so a cancelled or panicking request cannot leave it behind.
/// [`MediaAsset::discard`] removes it explicitly and logs the result.
#[derive(Debug)]
pub struct MediaAsset {
    source: MediaReference,
    file: TempPath,
    size: u64,
}

impl MediaAsset {
    /// Take ownership of a media file already written to `file`
    #[must_use]
    pub const fn new(source: MediaReference, file: TempPath, size: u64) -> Self {
        Self { source, file, size }
    }

    /// Reel the media was retrieved from
    #[must_use]
    pub const fn source(&self) -> &MediaReference {
        &self.source
    }

    /// Location of the temporary file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// File name component of the temporary file
    #[must_use]
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map_or_else(|| "reel.mp4".to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Remove the temporary file now
    pub fn discard(self) {
        let path = self.file.to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Removed temporary media file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove temporary media file");
            }
        }
    }
}

/// Public URL of a rehosted asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RehostedLink(String);

impl RehostedLink {
    /// Wrap a link returned by the file host
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Link as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RehostedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
