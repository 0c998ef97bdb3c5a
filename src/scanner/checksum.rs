//! BLAKE3 content checksums.
//!
//! # Overview
//! A content checksum identifies the bytes of a file. It answers two
//! questions only: "is this content already known?" and "was this file
//! modified since it was last seen?". It is never used for similarity.
//!
//! Two modes exist:
//! - [`ChecksumMode::Full`] hashes the whole file.
//! - [`ChecksumMode::Fast`] hashes only the first [`FAST_PREFIX_SIZE`] bytes.
//!   Much cheaper on large images, at the cost of missing edits past the prefix.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Number of leading bytes hashed in fast mode.
pub const FAST_PREFIX_SIZE: usize = 512;

/// Read buffer for full-content hashing.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Which part of the file a checksum covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Whole file content.
    Full,
    /// Leading prefix only.
    Fast,
}

impl ChecksumMode {
    /// Select the mode from the user-facing `--fast` flag.
    #[must_use]
    pub fn from_fast_flag(fast: bool) -> Self {
        if fast {
            Self::Fast
        } else {
            Self::Full
        }
    }

    /// The mode that is not `self`.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Full => Self::Fast,
            Self::Fast => Self::Full,
        }
    }
}

impl std::fmt::Display for ChecksumMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// A 32-byte BLAKE3 digest.
pub type Digest = [u8; 32];

/// Errors that can occur while checksumming a file.
#[derive(thiserror::Error, Debug)]
pub enum ChecksumError {
    /// The file does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ChecksumError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Compute the content checksum of `path` in the given mode.
///
/// # Errors
///
/// Returns [`ChecksumError::NotFound`] if the file is gone, or
/// [`ChecksumError::Io`] on any other read failure.
pub fn checksum_file(path: &Path, mode: ChecksumMode) -> Result<Digest, ChecksumError> {
    let file = File::open(path).map_err(|e| ChecksumError::from_io(path, e))?;
    let mut hasher = blake3::Hasher::new();

    match mode {
        ChecksumMode::Fast => {
            let mut prefix = Vec::with_capacity(FAST_PREFIX_SIZE);
            file.take(FAST_PREFIX_SIZE as u64)
                .read_to_end(&mut prefix)
                .map_err(|e| ChecksumError::from_io(path, e))?;
            hasher.update(&prefix);
        }
        ChecksumMode::Full => {
            let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                let n = reader
                    .read(&mut buffer)
                    .map_err(|e| ChecksumError::from_io(path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
        }
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Convert a digest to lowercase hex.
#[must_use]
pub fn digest_to_hex(digest: &Digest) -> String {
    hex::encode(digest)
}

/// Parse a hex digest. Returns `None` unless it is exactly 32 bytes.
#[must_use]
pub fn hex_to_digest(s: &str) -> Option<Digest> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identical_content_same_digest() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        for mode in [ChecksumMode::Full, ChecksumMode::Fast] {
            assert_eq!(
                checksum_file(&a, mode).unwrap(),
                checksum_file(&b, mode).unwrap()
            );
        }
    }

    #[test]
    fn test_fast_mode_ignores_tail() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut content = vec![7u8; FAST_PREFIX_SIZE + 100];
        fs::write(&a, &content).unwrap();
        content[FAST_PREFIX_SIZE + 50] = 8;
        fs::write(&b, &content).unwrap();

        assert_eq!(
            checksum_file(&a, ChecksumMode::Fast).unwrap(),
            checksum_file(&b, ChecksumMode::Fast).unwrap()
        );
        assert_ne!(
            checksum_file(&a, ChecksumMode::Full).unwrap(),
            checksum_file(&b, ChecksumMode::Full).unwrap()
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = checksum_file(&dir.path().join("gone.png"), ChecksumMode::Full).unwrap_err();
        assert!(matches!(err, ChecksumError::NotFound(_)));
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = [0xABu8; 32];
        let hex = digest_to_hex(&digest);
        assert_eq!(hex.len(), 64);
        assert_eq!(hex_to_digest(&hex), Some(digest));
        assert_eq!(hex_to_digest("abcd"), None);
        assert_eq!(hex_to_digest("zz"), None);
    }
}
