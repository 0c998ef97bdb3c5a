//! Duplicate detection over the hash database.
//!
//! Two passes are offered:
//! * binary: records reachable through several paths, no image decoding;
//! * perceptual: records whose fingerprints are within a [`Threshold`].
//!
//! plus a single-sample [`query`].

pub mod finder;
pub mod groups;

pub use finder::{binary_duplicates, query, similar_groups};
pub use groups::{
    similarity_percent, BinaryDuplicateSet, SimilarGroup, SimilarMember, Threshold,
    DEFAULT_THRESHOLD, DISTANCE_TOLERANCE,
};
