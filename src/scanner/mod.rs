//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Listing image files per directory using walkdir
//! - Content checksums with BLAKE3 ([`checksum`])
//! - Perceptual hash algorithms and their registry ([`perceptual`])
//!
//! # Example
//!
//! ```no_run
//! use imagedups::scanner::list_directories;
//! use std::path::Path;
//!
//! for batch in list_directories(Path::new("."), true).unwrap() {
//!     println!("{}: {} images", batch.dir.display(), batch.files.len());
//! }
//! ```

pub mod checksum;
pub mod marr_hildreth;
pub mod perceptual;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

// Re-export main types
pub use checksum::{checksum_file, ChecksumError, ChecksumMode, Digest, FAST_PREFIX_SIZE};
pub use marr_hildreth::MarrHildrethAlgorithm;
pub use perceptual::{AlgorithmError, AlgorithmRegistry, Fingerprint, HashAlgorithm};

/// File extensions (lowercase) treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpeg", "jpg", "tiff", "tif"];

/// Image files found directly inside one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBatch {
    /// The directory
    pub dir: PathBuf,
    /// Image file names in the directory, sorted
    pub files: Vec<String>,
}

impl DirectoryBatch {
    /// Full paths of the files in this batch, in file-name order.
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files.iter().map(|name| self.dir.join(name))
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Check whether a file name has an image extension.
#[must_use]
pub fn is_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// List image files under `path`, grouped per directory.
///
/// Without `recursive` only `path` itself is listed. With `recursive` every
/// subdirectory yields its own batch; directories are returned in sorted
/// order and file names within each batch are sorted. Directories without
/// images are omitted. Unreadable subdirectories are logged and skipped.
///
/// # Errors
///
/// Fails if `path` does not exist, is not a directory, or cannot be read.
pub fn list_directories(path: &Path, recursive: bool) -> Result<Vec<DirectoryBatch>, ScanError> {
    let metadata = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ScanError::NotFound(path.to_path_buf())
        } else {
            ScanError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(path.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut batches: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    batches.insert(path.to_path_buf(), Vec::new());

    for entry in WalkDir::new(path).min_depth(1).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ScanError::Io {
                    path: path.to_path_buf(),
                    source: e.into(),
                })
            }
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            log::warn!("Skipping non UTF-8 file name: {}", entry.path().display());
            continue;
        };
        if !is_image(name) {
            continue;
        }
        let dir = entry
            .path()
            .parent()
            .map_or_else(|| path.to_path_buf(), Path::to_path_buf);
        batches.entry(dir).or_default().push(name.to_string());
    }

    Ok(batches
        .into_iter()
        .filter(|(_, files)| !files.is_empty())
        .map(|(dir, mut files)| {
            files.sort();
            DirectoryBatch { dir, files }
        })
        .collect())
}
