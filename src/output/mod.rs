//! User-facing reports for pipeline results.
//!
//! The pipeline pushes events to a [`Reporter`] as it goes, so text output
//! appears before the viewer is opened for a group:
//! - [`TextReporter`] prints the classic line format
//! - [`JsonReporter`] collects everything and writes one document on finish
//!
//! # Example
//!
//! ```
//! use imagedups::output::{Reporter, TextReporter};
//!
//! let mut out = Vec::new();
//! let mut reporter = TextReporter::new(&mut out);
//! reporter.pruned(2).unwrap();
//! reporter.finish().unwrap();
//! assert_eq!(String::from_utf8(out).unwrap(), "Pruned 2 records without any file names\n");
//! ```

pub mod json;
pub mod text;

use std::path::Path;

use crate::duplicates::{BinaryDuplicateSet, SimilarGroup, SimilarMember};
use crate::store::RemovedAlias;

pub use json::JsonReporter;
pub use text::TextReporter;

/// Errors that can occur while writing a report.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error while writing output: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiver of pipeline results.
pub trait Reporter {
    /// An alias was dropped by remove or cleanup.
    fn alias_removed(&mut self, removed: &RemovedAlias) -> Result<(), OutputError>;

    /// Cleanup is starting; `scope` is `None` for the whole database.
    fn checking(&mut self, scope: Option<&Path>) -> Result<(), OutputError>;

    /// Prune deleted `count` records.
    fn pruned(&mut self, count: usize) -> Result<(), OutputError>;

    /// Search is starting over `records` records.
    fn searching(&mut self, records: usize) -> Result<(), OutputError>;

    /// The `number`-th binary duplicate set (1-based).
    fn binary_set(&mut self, number: usize, set: &BinaryDuplicateSet) -> Result<(), OutputError>;

    /// The `number`-th perceptual group (1-based).
    fn similar_group(&mut self, number: usize, group: &SimilarGroup) -> Result<(), OutputError>;

    /// Results of a single-sample query.
    fn query_result(&mut self, sample: &Path, matches: &[SimilarMember])
        -> Result<(), OutputError>;

    /// Flush anything still buffered.
    fn finish(&mut self) -> Result<(), OutputError>;
}

/// Title shown for a binary duplicate set.
#[must_use]
pub fn binary_title(number: usize) -> String {
    format!("Binary equal (set #{number})")
}

/// Title shown for a perceptual group.
#[must_use]
pub fn similar_title(number: usize) -> String {
    format!("Perceptually similar (set #{number})")
}

/// Title shown for query results.
pub const QUERY_TITLE: &str = "Perceptually similar";
