//! Snapshot-backed hash database.
//!
//! The whole database lives in memory while the tool runs and is written
//! back as one gzip-compressed, tab-indented JSON document. Saving goes
//! through a temporary file in the same directory followed by a rename, so
//! an interrupted save never truncates the previous snapshot.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::record::HashRecord;
use crate::scanner::{checksum_file, ChecksumError, ChecksumMode, Digest};

/// Errors that can occur while loading, saving or updating the database.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The snapshot file does not exist.
    #[error("Hash database not found: {0}")]
    NotFound(PathBuf),

    /// Reading or writing the snapshot failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Snapshot path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The snapshot is not a valid document.
    #[error("Corrupted hash database: {0}")]
    Format(#[from] serde_json::Error),

    /// A file could not be checksummed.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// Handle to a record inside a [`HashStore`].
///
/// Stays valid until the next [`HashStore::prune`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

impl RecordId {
    /// Position of the record in the store.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The hash database.
#[derive(Debug, Default)]
pub struct HashStore {
    records: Vec<HashRecord>,
    /// Content checksum to record position, first record wins.
    index: HashMap<(ChecksumMode, Digest), usize>,
    /// Modes for which missing checksums have already been derived this run.
    derived_modes: HashSet<ChecksumMode>,
    /// Transient path scope, never persisted.
    scope: Option<PathBuf>,
}

impl HashStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records, indexing their persisted checksums.
    #[must_use]
    pub fn from_records(records: Vec<HashRecord>) -> Self {
        let mut store = Self {
            records,
            ..Self::default()
        };
        store.rebuild_index();
        store
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, record) in self.records.iter().enumerate() {
            for mode in [ChecksumMode::Full, ChecksumMode::Fast] {
                if let Some(digest) = record.checksums.get(mode) {
                    self.index.entry((mode, digest)).or_insert(pos);
                }
            }
        }
    }

    /// Number of records, including dead ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order, ignoring the path scope.
    #[must_use]
    pub fn records(&self) -> &[HashRecord] {
        &self.records
    }

    /// Look up a record by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale (obtained before a prune).
    #[must_use]
    pub fn record(&self, id: RecordId) -> &HashRecord {
        &self.records[id.0]
    }

    /// Handles of all records, ignoring the path scope.
    pub fn ids(&self) -> impl Iterator<Item = RecordId> {
        (0..self.records.len()).map(RecordId)
    }

    /// Add `path` to the store and return the record holding its content.
    ///
    /// If a record with the same content checksum already exists, `path`
    /// becomes one more alias of it and its fingerprints are kept as they
    /// are. Otherwise a new record with no fingerprints is created.
    ///
    /// # Errors
    ///
    /// Fails if `path` cannot be read.
    pub fn add(&mut self, path: &Path, fast: bool) -> Result<RecordId, StoreError> {
        let mode = ChecksumMode::from_fast_flag(fast);
        let digest = checksum_file(path, mode)?;

        if let Some(id) = self.find_by_checksum(mode, &digest) {
            if self.records[id.0].aliases.insert(path.to_path_buf()) {
                log::debug!("{} matches known content", path.display());
            }
            return Ok(id);
        }

        let mut record = HashRecord::new(path.to_path_buf());
        record.checksums.set(mode, digest);
        let pos = self.records.len();
        self.records.push(record);
        self.index.insert((mode, digest), pos);
        log::debug!("{} is new content", path.display());
        Ok(RecordId(pos))
    }

    /// Find the record whose `mode` checksum equals `digest`.
    ///
    /// On the first miss per mode, records that lack a checksum for that
    /// mode get one derived from their first alias whose content still
    /// matches the record's other checksum.
    fn find_by_checksum(&mut self, mode: ChecksumMode, digest: &Digest) -> Option<RecordId> {
        if let Some(&pos) = self.index.get(&(mode, *digest)) {
            return Some(RecordId(pos));
        }
        if self.derived_modes.insert(mode) {
            self.derive_missing_checksums(mode);
            return self.index.get(&(mode, *digest)).map(|&pos| RecordId(pos));
        }
        None
    }

    fn derive_missing_checksums(&mut self, mode: ChecksumMode) {
        let mut derived = 0usize;
        for pos in 0..self.records.len() {
            if self.records[pos].checksums.get(mode).is_some() {
                continue;
            }
            let record = &self.records[pos];
            let digest = record
                .aliases
                .iter()
                .find_map(|alias| record.checksums.derive(alias, mode).ok().flatten());
            if let Some(digest) = digest {
                self.set_checksum(RecordId(pos), mode, digest);
                derived += 1;
            }
        }
        if derived > 0 {
            log::debug!("Derived {} {} checksums from existing files", derived, mode);
        }
    }

    /// Record the `mode` checksum of a record and index it.
    pub(crate) fn set_checksum(&mut self, id: RecordId, mode: ChecksumMode, digest: Digest) {
        self.records[id.0].checksums.set(mode, digest);
        self.index.entry((mode, digest)).or_insert(id.0);
    }

    /// Store an encoded fingerprint for `algorithm`.
    pub fn set_fingerprint(&mut self, id: RecordId, algorithm: &str, encoded: String) {
        self.records[id.0]
            .fingerprints
            .insert(algorithm.to_string(), encoded);
    }

    /// Remove one alias from a record. Returns whether it was present.
    ///
    /// The record itself is kept even if this was its last alias.
    pub fn remove_alias(&mut self, id: RecordId, alias: &Path) -> bool {
        self.records[id.0].aliases.remove(alias)
    }

    /// Restrict grouping and queries to records with an alias under `path`.
    ///
    /// The scope lasts for the rest of the run and is never saved.
    pub fn filter_by_path(&mut self, path: &Path) {
        self.scope = Some(path.to_path_buf());
    }

    /// The current path scope.
    #[must_use]
    pub fn scope(&self) -> Option<&Path> {
        self.scope.as_deref()
    }

    /// Records with at least one alias under `path`.
    pub fn records_under_path<'a>(
        &'a self,
        path: &'a Path,
    ) -> impl Iterator<Item = (RecordId, &'a HashRecord)> {
        self.records
            .iter()
            .enumerate()
            .filter(move |(_, record)| record.aliases_under(Some(path)).next().is_some())
            .map(|(pos, record)| (RecordId(pos), record))
    }

    /// Records in the current scope (all live records when unscoped).
    pub fn scoped_records(&self) -> Box<dyn Iterator<Item = (RecordId, &HashRecord)> + '_> {
        match self.scope.as_deref() {
            Some(scope) => Box::new(self.records_under_path(scope)),
            None => Box::new(
                self.records
                    .iter()
                    .enumerate()
                    .filter(|(_, record)| !record.is_dead())
                    .map(|(pos, record)| (RecordId(pos), record)),
            ),
        }
    }

    /// Aliases of `record` visible in the current scope.
    #[must_use]
    pub fn visible_aliases<'a>(&'a self, record: &'a HashRecord) -> Vec<&'a Path> {
        record.aliases_under(self.scope.as_deref()).collect()
    }

    /// Distinct top-level directories holding aliases.
    ///
    /// Parent directories of all aliases, with any directory nested inside
    /// another listed one dropped.
    #[must_use]
    pub fn top_level_paths(&self) -> Vec<PathBuf> {
        let parents: BTreeSet<&Path> = self
            .records
            .iter()
            .flat_map(|record| record.aliases.iter())
            .filter_map(|alias| alias.parent())
            .collect();

        let mut top: Vec<PathBuf> = Vec::new();
        for dir in parents {
            if top.last().is_some_and(|last| dir.starts_with(last)) {
                continue;
            }
            top.push(dir.to_path_buf());
        }
        top
    }

    /// Remove every record without aliases. Returns how many were removed.
    ///
    /// Invalidates all outstanding [`RecordId`]s.
    pub fn prune(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|record| !record.is_dead());
        let pruned = before - self.records.len();
        if pruned > 0 {
            self.rebuild_index();
        }
        pruned
    }

    /// Serialize all records as tab-indented JSON. The scope is ignored.
    ///
    /// # Errors
    ///
    /// Fails only if a path cannot be represented as UTF-8.
    pub fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.records.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Rebuild a store from a document produced by [`HashStore::serialize`].
    ///
    /// # Errors
    ///
    /// Fails if the document is not a valid record list.
    pub fn deserialize(data: &[u8]) -> Result<Self, StoreError> {
        let records: Vec<HashRecord> = serde_json::from_slice(data)?;
        Ok(Self::from_records(records))
    }

    /// Load a gzip-compressed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the file is missing, or another
    /// variant if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(path.to_path_buf())
            } else {
                StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let mut data = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut data)
            .map_err(|e| StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        let store = Self::deserialize(&data)?;
        log::info!("Loaded database: {} files", store.len());
        Ok(store)
    }

    /// Atomically write the snapshot to `path`.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot cannot be written or renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let data = self.serialize()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        let mut encoder = GzEncoder::new(tmp, Compression::default());
        encoder.write_all(&data).map_err(io_err)?;
        let tmp = encoder.finish().map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        log::debug!("Saved {} records to {}", self.len(), path.display());
        Ok(())
    }
}
