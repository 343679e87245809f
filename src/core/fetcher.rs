//! Image fetcher for local files.
//!
//! Resolves a Source Key to a file on disk and confirms it is a readable
//! image using the `image` crate. Supports:
//! - Plain paths (relative ones resolve against an optional base directory)
//! - `file://` URLs
//!
//! Any other scheme fails: remote transport belongs to the host.

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::traits::{FetchOutcome, Fetcher};

/// How much of the image to read before calling it loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Header only (format + dimensions)
    #[default]
    Probe,
    /// Full pixel decode
    Decode,
}

#[derive(Debug)]
pub enum LoadError {
    UnsupportedScheme(String),
    Io(String),
    Image(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::UnsupportedScheme(e) => write!(f, "Unsupported scheme: {}", e),
            LoadError::Io(e) => write!(f, "IO error: {}", e),
            LoadError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Local image fetcher
#[derive(Debug, Clone, Default)]
pub struct ImageFetcher {
    base_dir: Option<PathBuf>,
    mode: LoadMode,
}

impl ImageFetcher {
    pub fn new(base_dir: Option<PathBuf>, mode: LoadMode) -> Self {
        Self { base_dir, mode }
    }

    /// Map a key to a filesystem path.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, LoadError> {
        let raw = if let Some(rest) = key.strip_prefix("file://") {
            rest
        } else if let Some((scheme, _)) = key.split_once("://") {
            return Err(LoadError::UnsupportedScheme(scheme.to_string()));
        } else {
            key
        };

        let path = Path::new(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => Ok(base.join(path)),
            _ => Ok(path.to_path_buf()),
        }
    }

    /// Load the image behind `key`, returning its dimensions.
    pub fn load(&self, key: &str) -> Result<(u32, u32), LoadError> {
        let path = self.resolve(key)?;

        let reader = image::ImageReader::open(&path)
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?
            .with_guessed_format()
            .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?;

        if reader.format().is_none() {
            return Err(LoadError::Image(format!("{}: unknown image format", path.display())));
        }

        match self.mode {
            LoadMode::Probe => reader
                .into_dimensions()
                .map_err(|e| LoadError::Image(format!("{}: {}", path.display(), e))),
            LoadMode::Decode => reader
                .decode()
                .map(|img| (img.width(), img.height()))
                .map_err(|e| LoadError::Image(format!("{}: {}", path.display(), e))),
        }
    }
}

impl Fetcher for ImageFetcher {
    fn fetch(&self, key: &str) -> FetchOutcome {
        match self.load(key) {
            Ok((width, height)) => {
                debug!("Fetched {} ({}x{}, {:?})", key, width, height, self.mode);
                FetchOutcome::Loaded
            }
            Err(e) => {
                debug!("Fetch failed for {}: {}", key, e);
                FetchOutcome::Failed
            }
        }
    }
}
