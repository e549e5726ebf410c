//! Image roster sources
//!
//! A roster is the ordered list of images one round spawns bubbles for. The
//! same layout is served either from a local directory tree or from the
//! image-listing HTTP API:
//!
//! - `images/`         normal-mode bubbles
//! - `bossimgs/`       boss-mode normal bubbles
//! - `superbubbleimg/` the super-entity image (first entry wins)

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::game::state::ModeKind;

/// Roster fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("Failed to read roster directory {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("Roster request failed: {0}")]
    Request(String),
    #[error("Malformed roster response: {0}")]
    Parse(String),
}

/// Which list to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RosterKind {
    Normal,
    BossNormal,
    Super,
}

impl RosterKind {
    /// Directory (and URL path segment) for this list
    pub fn folder(&self) -> &'static str {
        match self {
            RosterKind::Normal => "images",
            RosterKind::BossNormal => "bossimgs",
            RosterKind::Super => "superbubbleimg",
        }
    }
}

/// Images for one round
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Roster {
    pub images: Vec<String>,
    pub super_image: Option<String>,
}

/// Source of image lists
pub trait RosterSource: Send + Sync + 'static {
    fn fetch(&self, kind: RosterKind) -> impl Future<Output = Result<Vec<String>, RosterError>> + Send;
}

/// Fetch everything a mode needs: the normal list, or the boss list plus the
/// super image. A missing super image is not an error.
pub async fn load_for_mode<S: RosterSource>(source: &S, mode: ModeKind) -> Result<Roster, RosterError> {
    match mode {
        ModeKind::Normal => Ok(Roster {
            images: source.fetch(RosterKind::Normal).await?,
            super_image: None,
        }),
        ModeKind::Boss => {
            let images = source.fetch(RosterKind::BossNormal).await?;
            let super_image = match source.fetch(RosterKind::Super).await {
                Ok(list) => list.into_iter().next(),
                Err(e) => {
                    debug!("No super image available: {}", e);
                    None
                }
            };
            Ok(Roster { images, super_image })
        }
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "gif" | "webp"
            )
        })
        .unwrap_or(false)
}

/// Roster read from a local directory tree
#[derive(Debug, Clone)]
pub struct DirectoryRoster {
    root: PathBuf,
}

impl DirectoryRoster {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RosterSource for DirectoryRoster {
    fn fetch(&self, kind: RosterKind) -> impl Future<Output = Result<Vec<String>, RosterError>> + Send {
        let dir = self.root.join(kind.folder());
        async move {
            let io_err = |e: std::io::Error| RosterError::Io {
                path: dir.display().to_string(),
                reason: e.to_string(),
            };
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
            let mut files = Vec::new();
            while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
                let path = entry.path();
                if path.is_file() && is_image_file(&path) {
                    files.push(path.display().to_string());
                }
            }
            // Directory order is platform-dependent
            files.sort();
            Ok(files)
        }
    }
}

/// Roster served by the image-listing API
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpRoster {
    client: reqwest::Client,
    base: String,
}

#[cfg(feature = "http")]
impl HttpRoster {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// The normal list returns absolute paths (`/images/x.png`); the boss and
    /// super lists return bare filenames
    fn resolve(&self, kind: RosterKind, entry: &str) -> String {
        if entry.starts_with("http://") || entry.starts_with("https://") {
            entry.to_string()
        } else if entry.starts_with('/') {
            format!("{}{}", self.base, entry)
        } else {
            format!("{}/{}/{}", self.base, kind.folder(), entry)
        }
    }
}

#[cfg(feature = "http")]
impl RosterSource for HttpRoster {
    fn fetch(&self, kind: RosterKind) -> impl Future<Output = Result<Vec<String>, RosterError>> + Send {
        let url = format!("{}/api/{}", self.base, kind.folder());
        async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| RosterError::Request(e.to_string()))?;
            if !response.status().is_success() {
                return Err(RosterError::Request(format!("{} returned {}", url, response.status())));
            }
            let entries: Vec<String> = response
                .json()
                .await
                .map_err(|e| RosterError::Parse(e.to_string()))?;
            Ok(entries.iter().map(|e| self.resolve(kind, e)).collect())
        }
    }
}
