//! Persistent hash database.
//!
//! This module stores perceptual fingerprints between runs so unchanged
//! images are never hashed twice.
//!
//! # Architecture
//!
//! * [`record`]: a [`HashRecord`] is one content identity: the set of paths
//!   (aliases) holding the same bytes plus its cached fingerprints.
//! * [`database`]: the [`HashStore`] collection, lookup by content checksum,
//!   path scoping and snapshot persistence.
//! * [`lifecycle`]: cleanup, remove and prune.
//!
//! # Reconciliation
//!
//! Records are keyed by content checksum, not by path:
//! * A renamed or copied file matches an existing record on `add` and
//!   becomes an extra alias. No perceptual hash is computed.
//! * A deleted or edited file is dropped from its record by `cleanup`. The
//!   record keeps its fingerprints so the content can reappear later.
//! * Records with no aliases are removed only by `prune`.

pub mod database;
pub mod lifecycle;
pub mod record;

pub use database::{HashStore, RecordId, StoreError};
pub use lifecycle::{RemovalReason, RemovedAlias};
pub use record::{Checksums, HashRecord};
