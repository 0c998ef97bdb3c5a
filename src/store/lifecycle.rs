//! Alias maintenance: cleanup, remove and prune.
//!
//! Cleanup and remove only ever drop aliases. A record that loses its last
//! alias stays in the store, still holding its fingerprints, until
//! [`prune`] is called explicitly.

use std::path::{Path, PathBuf};

use super::database::{HashStore, RecordId};
use crate::scanner::{checksum_file, ChecksumError, ChecksumMode};

/// Why an alias was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The file no longer exists.
    Missing,
    /// The file content no longer matches the record.
    Modified,
    /// The file exists but could not be read.
    Unreadable,
    /// Explicitly removed by path.
    Requested,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Modified => write!(f, "modified"),
            Self::Unreadable => write!(f, "unreadable"),
            Self::Requested => write!(f, "removed"),
        }
    }
}

/// An alias dropped from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedAlias {
    /// Record the alias belonged to
    pub record: RecordId,
    /// The dropped path
    pub path: PathBuf,
    /// Why it was dropped
    pub reason: RemovalReason,
}

/// Re-validate aliases against the filesystem.
///
/// Every alias under `path` (every alias when `path` is `None`) is dropped if
/// the file is gone or its content checksum no longer matches the record's.
/// A record without a checksum for the requested mode takes the checksum of
/// its first alias that still matches the record's other checksum as
/// reference; aliases failing that check count as modified.
pub fn cleanup(store: &mut HashStore, path: Option<&Path>, fast: bool) -> Vec<RemovedAlias> {
    let mode = ChecksumMode::from_fast_flag(fast);
    let mut removed = Vec::new();

    let ids: Vec<RecordId> = store.ids().collect();
    for id in ids {
        let aliases: Vec<PathBuf> = store
            .record(id)
            .aliases_under(path)
            .map(Path::to_path_buf)
            .collect();
        let mut reference = store.record(id).checksums.get(mode);

        for alias in aliases {
            let current = match reference {
                Some(_) => checksum_file(&alias, mode).map(Some),
                None => store.record(id).checksums.derive(&alias, mode),
            };
            let reason = match current {
                Ok(Some(digest)) => match reference {
                    Some(expected) if expected == digest => None,
                    Some(_) => Some(RemovalReason::Modified),
                    None => {
                        store.set_checksum(id, mode, digest);
                        reference = Some(digest);
                        None
                    }
                },
                Ok(None) => Some(RemovalReason::Modified),
                Err(ChecksumError::NotFound(_)) => Some(RemovalReason::Missing),
                Err(e) => {
                    log::warn!("{}", e);
                    Some(RemovalReason::Unreadable)
                }
            };

            if let Some(reason) = reason {
                store.remove_alias(id, &alias);
                removed.push(RemovedAlias {
                    record: id,
                    path: alias,
                    reason,
                });
            }
        }
    }

    log::debug!("Cleanup dropped {} aliases", removed.len());
    removed
}

/// Drop aliases located under `path`.
///
/// With `recursive`, any alias whose path string starts with `path` is
/// dropped. Without it, only aliases whose parent directory is exactly
/// `path`.
pub fn remove(store: &mut HashStore, path: &Path, recursive: bool) -> Vec<RemovedAlias> {
    let prefix = path.to_string_lossy();
    let matches = |alias: &Path| {
        if recursive {
            alias.to_string_lossy().starts_with(&*prefix)
        } else {
            alias.parent() == Some(path)
        }
    };

    let mut removed = Vec::new();
    let ids: Vec<RecordId> = store.ids().collect();
    for id in ids {
        let doomed: Vec<PathBuf> = store
            .record(id)
            .aliases
            .iter()
            .filter(|alias| matches(alias))
            .cloned()
            .collect();
        for alias in doomed {
            store.remove_alias(id, &alias);
            removed.push(RemovedAlias {
                record: id,
                path: alias,
                reason: RemovalReason::Requested,
            });
        }
    }
    removed
}

/// Delete records that have no aliases left. Returns how many were deleted.
pub fn prune(store: &mut HashStore) -> usize {
    store.prune()
}
