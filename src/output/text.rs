//! Plain text report.
//!
//! ```text
//! --- Binary equal (set #1) ---
//! /pics/a.png
//! /pics/b.png
//! --- Perceptually similar (set #1) ---
//! /pics/c.png
//! /pics/c-small.png (97%)
//! ```

use std::io::Write;
use std::path::Path;

use super::{binary_title, similar_title, OutputError, Reporter};
use crate::duplicates::{BinaryDuplicateSet, SimilarGroup, SimilarMember};
use crate::store::{RemovalReason, RemovedAlias};

/// Line-oriented report written as events arrive.
pub struct TextReporter<W: Write> {
    writer: W,
}

impl<W: Write> TextReporter<W> {
    /// Create a reporter writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn member(&mut self, member: &SimilarMember) -> Result<(), OutputError> {
        writeln!(
            self.writer,
            "{} ({:.0}%)",
            member.path.display(),
            member.similarity()
        )?;
        Ok(())
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn alias_removed(&mut self, removed: &RemovedAlias) -> Result<(), OutputError> {
        match removed.reason {
            RemovalReason::Requested => {
                writeln!(self.writer, "Removing {}", removed.path.display())?;
            }
            reason => writeln!(
                self.writer,
                "Removing file reference {} ({})",
                removed.path.display(),
                reason
            )?,
        }
        Ok(())
    }

    fn checking(&mut self, scope: Option<&Path>) -> Result<(), OutputError> {
        match scope {
            Some(path) => writeln!(self.writer, "Checking {}", path.display())?,
            None => writeln!(self.writer, "Checking database")?,
        }
        Ok(())
    }

    fn pruned(&mut self, count: usize) -> Result<(), OutputError> {
        if count > 0 {
            writeln!(self.writer, "Pruned {count} records without any file names")?;
        }
        Ok(())
    }

    fn searching(&mut self, records: usize) -> Result<(), OutputError> {
        writeln!(self.writer, "Searching in {records} files")?;
        Ok(())
    }

    fn binary_set(&mut self, number: usize, set: &BinaryDuplicateSet) -> Result<(), OutputError> {
        writeln!(self.writer, "--- {} ---", binary_title(number))?;
        for path in &set.paths {
            writeln!(self.writer, "{}", path.display())?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn similar_group(&mut self, number: usize, group: &SimilarGroup) -> Result<(), OutputError> {
        writeln!(self.writer, "--- {} ---", similar_title(number))?;
        writeln!(self.writer, "{}", group.seed.display())?;
        for member in &group.members {
            self.member(member)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn query_result(
        &mut self,
        sample: &Path,
        matches: &[SimilarMember],
    ) -> Result<(), OutputError> {
        writeln!(self.writer, "{}", sample.display())?;
        for member in matches {
            self.member(member)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}
