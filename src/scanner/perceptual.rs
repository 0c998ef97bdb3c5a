//! Perceptual image hashing for similarity detection.
//!
//! This module defines the [`HashAlgorithm`] capability and the
//! [`AlgorithmRegistry`] that maps algorithm names (as stored in the hash
//! database and accepted by `--algorithm`) to implementations.
//!
//! The built-in algorithms are backed by `image_hasher`. All of them produce
//! bit-vector fingerprints compared by normalized Hamming distance, so `0.0`
//! means identical and `1.0` means every bit differs.
//!
//! # Example
//!
//! ```no_run
//! use imagedups::scanner::perceptual::AlgorithmRegistry;
//! use std::path::Path;
//!
//! let registry = AlgorithmRegistry::with_defaults();
//! let dct = registry.get("dct").unwrap();
//! let a = dct.compute(Path::new("a.png")).unwrap();
//! let b = dct.compute(Path::new("b.png")).unwrap();
//! println!("distance = {:.3}", dct.distance(&a, &b));
//! ```

use image_hasher::{HashAlg, HasherConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::marr_hildreth::MarrHildrethAlgorithm;

/// Name of the algorithm used when none is configured.
pub const DEFAULT_ALGORITHM: &str = "dct";

/// Raw perceptual hash bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Wrap raw hash bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bits in the hash.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.0.len() * 8
    }
}

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// No algorithm is registered under this name.
    #[error("Unknown hash algorithm '{name}' (available: {available})")]
    Unknown {
        /// The requested name
        name: String,
        /// Comma-separated registered names
        available: String,
    },

    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(PathBuf, #[source] image::ImageError),

    /// A stored fingerprint could not be decoded.
    #[error("Invalid {algorithm} fingerprint '{value}'")]
    InvalidEncoding {
        /// Algorithm the value was stored under
        algorithm: String,
        /// The offending text
        value: String,
    },
}

/// A perceptual hashing algorithm.
///
/// Implementations must be pure: `compute` may run on any worker thread and
/// must not touch shared state. `distance` must be symmetric and normalized
/// to `[0, 1]`.
pub trait HashAlgorithm: Send + Sync {
    /// Name under which fingerprints are stored.
    fn name(&self) -> &str;

    /// Compute the fingerprint of an image file.
    fn compute(&self, path: &Path) -> Result<Fingerprint, AlgorithmError>;

    /// Normalized distance between two fingerprints.
    ///
    /// The default is Hamming distance divided by the bit length. Fingerprints
    /// of different lengths are maximally distant.
    fn distance(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        hamming_distance(a, b)
    }

    /// Encode a fingerprint as uppercase hex.
    fn encode(&self, hash: &Fingerprint) -> String {
        hex::encode_upper(hash.as_bytes())
    }

    /// Decode a fingerprint previously produced by [`HashAlgorithm::encode`].
    fn decode(&self, text: &str) -> Result<Fingerprint, AlgorithmError> {
        hex::decode(text)
            .map(Fingerprint::from_bytes)
            .map_err(|_| AlgorithmError::InvalidEncoding {
                algorithm: self.name().to_string(),
                value: text.to_string(),
            })
    }
}

/// Normalized Hamming distance between two bit-vector fingerprints.
#[must_use]
pub fn hamming_distance(a: &Fingerprint, b: &Fingerprint) -> f64 {
    if a.as_bytes().len() != b.as_bytes().len() || a.as_bytes().is_empty() {
        return 1.0;
    }
    let differing: u32 = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    f64::from(differing) / a.bit_len() as f64
}

/// An `image_hasher` based algorithm.
///
/// Only the hasher parameters are stored; the hasher itself is built per
/// call so the algorithm stays `Send + Sync` regardless of `image_hasher`
/// internals.
#[derive(Debug, Clone)]
pub struct ImageHasherAlgorithm {
    name: &'static str,
    alg: HashAlg,
    dct: bool,
    size: u32,
}

impl ImageHasherAlgorithm {
    /// Create an algorithm with an 8x8 (64 bit) hash.
    #[must_use]
    pub fn new(name: &'static str, alg: HashAlg, dct: bool) -> Self {
        Self {
            name,
            alg,
            dct,
            size: 8,
        }
    }

    fn hasher(&self) -> image_hasher::Hasher {
        let mut config = HasherConfig::new()
            .hash_size(self.size, self.size)
            .hash_alg(self.alg);
        if self.dct {
            config = config.preproc_dct();
        }
        config.to_hasher()
    }
}

impl HashAlgorithm for ImageHasherAlgorithm {
    fn name(&self) -> &str {
        self.name
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, AlgorithmError> {
        let img = image::open(path).map_err(|e| AlgorithmError::LoadError(path.to_path_buf(), e))?;
        let hash = self.hasher().hash_image(&img);
        Ok(Fingerprint::from_bytes(hash.as_bytes().to_vec()))
    }
}

/// Registry of named hash algorithms.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<String, Arc<dyn HashAlgorithm>>,
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}

impl AlgorithmRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in algorithms.
    ///
    /// - `dct`: DCT preprocessed median hash (pHash)
    /// - `mean`: average hash (aHash)
    /// - `gradient`: difference hash (dHash)
    /// - `doublegradient`: horizontal and vertical difference hash
    /// - `blockhash`: Blockhash.io
    /// - `mh`: Marr-Hildreth edge hash, 72 bytes
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ImageHasherAlgorithm::new(DEFAULT_ALGORITHM, HashAlg::Median, true));
        registry.register(ImageHasherAlgorithm::new("mean", HashAlg::Mean, false));
        registry.register(ImageHasherAlgorithm::new("gradient", HashAlg::Gradient, false));
        registry.register(ImageHasherAlgorithm::new(
            "doublegradient",
            HashAlg::DoubleGradient,
            false,
        ));
        registry.register(ImageHasherAlgorithm::new("blockhash", HashAlg::Blockhash, false));
        registry.register(MarrHildrethAlgorithm::default());
        registry
    }

    /// Register an algorithm under its own name, replacing any previous one.
    pub fn register<A: HashAlgorithm + 'static>(&mut self, algorithm: A) {
        self.register_arc(Arc::new(algorithm));
    }

    /// Register a shared algorithm instance.
    pub fn register_arc(&mut self, algorithm: Arc<dyn HashAlgorithm>) {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
    }

    /// Look up an algorithm by name.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError::Unknown`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn HashAlgorithm>, AlgorithmError> {
        self.algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| AlgorithmError::Unknown {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.algorithms.keys().map(String::as_str).collect()
    }
}
