//! Image byte fetchers
//!
//! Fetchers run on texture worker threads and may block.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

/// Image fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("Image request failed: {0}")]
    Request(String),
    #[error("Image server returned {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Unsupported image reference: {0}")]
    Unsupported(String),
}

impl FetchError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Io { .. } | FetchError::Request(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::NotFound(_) | FetchError::Unsupported(_) => false,
        }
    }
}

/// Source of raw image bytes
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetch with up to `retries` extra attempts, sleeping `backoff * attempt`
/// between them. Non-retryable errors return immediately.
pub fn fetch_with_retry<F: ImageFetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    retries: u32,
    backoff: Duration,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                debug!(url, attempt, "Retrying image fetch: {}", e);
                std::thread::sleep(backoff * attempt);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reads images from the local filesystem.
///
/// Accepts either a path that exists as given, or a site-absolute reference
/// like `/images/a.png` resolved under `root`.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Err(FetchError::Unsupported(url.to_string()));
        }
        let direct = Path::new(url);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        Ok(self.root.join(url.trim_start_matches('/')))
    }
}

impl ImageFetcher for FsFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(url)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        })
    }
}

/// Fetches images over HTTP. Relative references are joined to `base`.
#[cfg(feature = "http")]
pub struct HttpFetcher {
    base: Option<String>,
    // Created on first use so construction is safe inside an async context
    client: std::sync::OnceLock<reqwest::blocking::Client>,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(base: Option<String>) -> Self {
        Self {
            base: base.map(|b| b.trim_end_matches('/').to_string()),
            client: std::sync::OnceLock::new(),
        }
    }

    fn absolute(&self, url: &str) -> Result<String, FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        match &self.base {
            Some(base) => Ok(format!("{}/{}", base, url.trim_start_matches('/'))),
            None => Err(FetchError::Unsupported(url.to_string())),
        }
    }
}

#[cfg(feature = "http")]
impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.absolute(url)?;
        let client = self.client.get_or_init(reqwest::blocking::Client::new);
        let response = client
            .get(&url)
            .send()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url));
        }
        if !status.is_success() {
            return Err(FetchError::Status { url, status: status.as_u16() });
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Request(e.to_string()))
    }
}
