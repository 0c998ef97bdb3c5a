//! JSON report for scripting.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "removed": [{ "path": "/old/a.png", "reason": "removed" }],
//!   "pruned": 0,
//!   "searched": 120,
//!   "binary": [{ "paths": ["/pics/a.png", "/pics/b.png"] }],
//!   "similar": [
//!     {
//!       "seed": "/pics/c.png",
//!       "members": [{ "path": "/pics/d.png", "distance": 0.03125, "similarity": 96.875 }]
//!     }
//!   ],
//!   "query": null
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{OutputError, Reporter};
use crate::duplicates::{BinaryDuplicateSet, SimilarGroup, SimilarMember};
use crate::store::RemovedAlias;

/// A dropped alias in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRemoved {
    /// Dropped path
    pub path: PathBuf,
    /// Why it was dropped
    pub reason: String,
}

/// A similar image in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonMember {
    /// Image path
    pub path: PathBuf,
    /// Normalized distance to the reference image
    pub distance: f64,
    /// Similarity in percent
    pub similarity: f64,
}

impl From<&SimilarMember> for JsonMember {
    fn from(member: &SimilarMember) -> Self {
        Self {
            path: member.path.clone(),
            distance: member.distance,
            similarity: member.similarity(),
        }
    }
}

/// A perceptual group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Image the group was started from
    pub seed: PathBuf,
    /// Other images in the group
    pub members: Vec<JsonMember>,
}

/// Query results in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonQuery {
    /// The sample image
    pub sample: PathBuf,
    /// Matching images, closest first
    pub matches: Vec<JsonMember>,
}

/// Complete JSON document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JsonDocument {
    /// Aliases dropped by remove or cleanup
    pub removed: Vec<JsonRemoved>,
    /// Records deleted by prune
    pub pruned: usize,
    /// Records considered by the search, if one ran
    pub searched: Option<usize>,
    /// Binary duplicate sets
    pub binary: Vec<BinaryDuplicateSet>,
    /// Perceptual groups
    pub similar: Vec<JsonGroup>,
    /// Query results, if a sample was given
    pub query: Option<JsonQuery>,
}

/// Collects events and writes a single JSON document on [`Reporter::finish`].
pub struct JsonReporter<W: Write> {
    writer: W,
    pretty: bool,
    document: JsonDocument,
}

impl<W: Write> JsonReporter<W> {
    /// Create a reporter writing to `writer`.
    pub fn new(writer: W, pretty: bool) -> Self {
        Self {
            writer,
            pretty,
            document: JsonDocument::default(),
        }
    }

    /// The document collected so far.
    #[must_use]
    pub fn document(&self) -> &JsonDocument {
        &self.document
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn alias_removed(&mut self, removed: &RemovedAlias) -> Result<(), OutputError> {
        self.document.removed.push(JsonRemoved {
            path: removed.path.clone(),
            reason: removed.reason.to_string(),
        });
        Ok(())
    }

    fn checking(&mut self, _scope: Option<&Path>) -> Result<(), OutputError> {
        Ok(())
    }

    fn pruned(&mut self, count: usize) -> Result<(), OutputError> {
        self.document.pruned += count;
        Ok(())
    }

    fn searching(&mut self, records: usize) -> Result<(), OutputError> {
        self.document.searched = Some(records);
        Ok(())
    }

    fn binary_set(&mut self, _number: usize, set: &BinaryDuplicateSet) -> Result<(), OutputError> {
        self.document.binary.push(set.clone());
        Ok(())
    }

    fn similar_group(&mut self, _number: usize, group: &SimilarGroup) -> Result<(), OutputError> {
        self.document.similar.push(JsonGroup {
            seed: group.seed.clone(),
            members: group.members.iter().map(JsonMember::from).collect(),
        });
        Ok(())
    }

    fn query_result(
        &mut self,
        sample: &Path,
        matches: &[SimilarMember],
    ) -> Result<(), OutputError> {
        self.document.query = Some(JsonQuery {
            sample: sample.to_path_buf(),
            matches: matches.iter().map(JsonMember::from).collect(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &self.document)?;
        } else {
            serde_json::to_writer(&mut self.writer, &self.document)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
