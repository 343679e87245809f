//! Utility functions and constants
//!
//! **Used by**: main (building item lists from directories and manifests)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Image file type detection
pub mod media {
    use std::path::Path;

    /// Supported image file extensions
    pub const IMAGE_EXTS: &[&str] = &[
        "exr", "png", "jpg", "jpeg", "tif", "tiff", "tga", "hdr", "gif", "webp", "bmp",
    ];

    /// Check if file is an image format
    pub fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| IMAGE_EXTS.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// All image files directly inside `dir`, sorted by path.
pub fn expand_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut list: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| media::is_image(path))
        .collect();

    list.sort();
    Ok(list)
}

/// Parse a manifest: one key per line, blank line = item without a key,
/// `#` starts a comment line (not an item).
pub fn parse_manifest(text: &str) -> Vec<Option<String>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .map(|line| if line.is_empty() { None } else { Some(line.to_string()) })
        .collect()
}

pub fn read_manifest(path: &Path) -> Result<Vec<Option<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    Ok(parse_manifest(&text))
}
