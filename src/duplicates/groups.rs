//! Duplicate group types and the similarity threshold.
//!
//! # Example
//!
//! ```
//! use imagedups::duplicates::Threshold;
//!
//! let threshold = Threshold::new(80.0).unwrap();
//! assert!(threshold.accepts(0.2));
//! assert!(!threshold.accepts(0.21));
//! ```

use serde::Serialize;
use std::path::PathBuf;

use crate::store::RecordId;

/// Slack applied when comparing a distance against the maximum, so that a
/// distance exactly on the boundary is not lost to `1 - t/100` rounding.
pub const DISTANCE_TOLERANCE: f64 = 1e-9;

/// Default similarity percentage.
pub const DEFAULT_THRESHOLD: f64 = 90.0;

/// A similarity threshold in percent.
///
/// 100 accepts only identical fingerprints, 0 accepts everything.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Threshold(f64);

impl Threshold {
    /// Create a threshold from a percentage in `[0, 100]`.
    ///
    /// Returns `None` for values outside that range or NaN.
    #[must_use]
    pub fn new(percent: f64) -> Option<Self> {
        (0.0..=100.0).contains(&percent).then_some(Self(percent))
    }

    /// The percentage.
    #[must_use]
    pub fn percent(self) -> f64 {
        self.0
    }

    /// Largest normalized distance considered similar.
    #[must_use]
    pub fn max_distance(self) -> f64 {
        1.0 - self.0 / 100.0
    }

    /// Whether `distance` is within the threshold (inclusive).
    #[must_use]
    pub fn accepts(self, distance: f64) -> bool {
        distance <= self.max_distance() + DISTANCE_TOLERANCE
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

/// Convert a distance to the similarity percentage shown to users.
#[must_use]
pub fn similarity_percent(distance: f64) -> f64 {
    (1.0 - distance) * 100.0
}

/// Several paths holding byte-identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryDuplicateSet {
    /// The shared record
    #[serde(skip)]
    pub record: RecordId,
    /// Visible aliases, sorted
    pub paths: Vec<PathBuf>,
}

impl BinaryDuplicateSet {
    /// Number of paths in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A path with its distance to a reference image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMember {
    /// Image path
    pub path: PathBuf,
    /// Normalized distance to the reference, in `[0, 1]`
    pub distance: f64,
}

impl SimilarMember {
    /// Similarity to the reference in percent.
    #[must_use]
    pub fn similarity(&self) -> f64 {
        similarity_percent(self.distance)
    }
}

/// Images perceptually similar to a seed image.
///
/// Membership is decided by distance to the seed only. Two members may be
/// further apart from each other than the threshold allows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarGroup {
    /// The image the group was started from
    pub seed: PathBuf,
    /// Other images within the threshold of the seed, in candidate order
    pub members: Vec<SimilarMember>,
}

impl SimilarGroup {
    /// Number of images including the seed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    /// Always false: a group contains at least its seed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Seed followed by every member path.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.seed.clone())
            .chain(self.members.iter().map(|m| m.path.clone()))
            .collect()
    }
}
