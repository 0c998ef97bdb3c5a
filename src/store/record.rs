//! Hash record definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::scanner::{checksum_file, ChecksumError, ChecksumMode, Digest};

/// Content checksums known for a record, at most one per mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    /// Whole-file digest
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex_digest")]
    pub full: Option<Digest>,
    /// Prefix digest
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex_digest")]
    pub fast: Option<Digest>,
}

impl Checksums {
    /// Digest for `mode`, if known.
    #[must_use]
    pub fn get(&self, mode: ChecksumMode) -> Option<Digest> {
        match mode {
            ChecksumMode::Full => self.full,
            ChecksumMode::Fast => self.fast,
        }
    }

    pub(crate) fn set(&mut self, mode: ChecksumMode, digest: Digest) {
        match mode {
            ChecksumMode::Full => self.full = Some(digest),
            ChecksumMode::Fast => self.fast = Some(digest),
        }
    }

    /// Compute the `mode` digest of `alias`, trusting it only if the alias
    /// still matches the digest already held for the other mode.
    ///
    /// Returns `Ok(None)` when the alias no longer matches. With no digest
    /// for either mode there is nothing to verify against and the current
    /// content is taken as is.
    ///
    /// # Errors
    ///
    /// Fails if `alias` cannot be read.
    pub fn derive(&self, alias: &Path, mode: ChecksumMode) -> Result<Option<Digest>, ChecksumError> {
        if let Some(expected) = self.get(mode.other()) {
            if checksum_file(alias, mode.other())? != expected {
                return Ok(None);
            }
        }
        checksum_file(alias, mode).map(Some)
    }

    /// True when no digest is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full.is_none() && self.fast.is_none()
    }
}

/// One content identity in the hash database.
///
/// All aliases are believed, as of the last add or cleanup, to hold the same
/// bytes. A record whose aliases have all been removed is kept until prune so
/// that a reappearing file can reuse its fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// File paths sharing this content, sorted and unique
    pub aliases: BTreeSet<PathBuf>,
    /// Encoded perceptual hash per algorithm name
    #[serde(default)]
    pub fingerprints: BTreeMap<String, String>,
    /// Content checksums
    #[serde(default, skip_serializing_if = "Checksums::is_empty")]
    pub checksums: Checksums,
}

impl HashRecord {
    /// Create a record with a single alias and no fingerprints.
    #[must_use]
    pub fn new(alias: PathBuf) -> Self {
        Self {
            aliases: BTreeSet::from([alias]),
            ..Self::default()
        }
    }

    /// Whether a fingerprint for `algorithm` has been computed.
    #[must_use]
    pub fn has_fingerprint(&self, algorithm: &str) -> bool {
        self.fingerprints.contains_key(algorithm)
    }

    /// Encoded fingerprint for `algorithm`.
    #[must_use]
    pub fn fingerprint(&self, algorithm: &str) -> Option<&str> {
        self.fingerprints.get(algorithm).map(String::as_str)
    }

    /// Whether the record has lost all of its aliases.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Aliases under `scope` (all aliases when `scope` is `None`), in order.
    pub fn aliases_under<'a>(&'a self, scope: Option<&'a Path>) -> impl Iterator<Item = &'a Path> {
        self.aliases
            .iter()
            .map(PathBuf::as_path)
            .filter(move |alias| scope.is_none_or(|s| alias.starts_with(s)))
    }
}

mod opt_hex_digest {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::scanner::checksum::{digest_to_hex, hex_to_digest};
    use crate::scanner::Digest;

    pub fn serialize<S: Serializer>(value: &Option<Digest>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(digest) => s.serialize_some(&digest_to_hex(digest)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Digest>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| {
                hex_to_digest(&text)
                    .ok_or_else(|| de::Error::custom(format!("invalid checksum '{text}'")))
            })
            .transpose()
    }
}
