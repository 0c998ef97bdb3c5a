//! Concurrent perceptual hash computation.
//!
//! # Overview
//!
//! [`ConcurrentHasher::hash_directory`] brings one directory's images up to
//! date in the [`HashStore`]:
//!
//! 1. Each file is added to the store on the calling thread, in file-name
//!    order. Files whose content is already known reuse the existing record.
//! 2. Records still missing a fingerprint for the selected algorithm get a
//!    job on a bounded rayon pool. The `(record, job)` pairs are queued in
//!    submission order.
//! 3. The queue is drained front to back. Each result is written to the
//!    store as soon as it is received.
//!
//! # Head-of-line blocking
//!
//! Results are applied strictly in submission order. A slow job at the front
//! holds back results that finished earlier behind it. In exchange the store
//! is only ever mutated by the calling thread, so it needs no locking, and a
//! failure has a simple outcome: every pair before the failing one is
//! applied, every pair after it is dropped and will be retried on the next
//! run because its fingerprint is still missing.

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::progress::{NoProgress, ProgressCallback};
use crate::scanner::{AlgorithmError, ChecksumError, DirectoryBatch, Fingerprint, HashAlgorithm};
use crate::store::{HashStore, RecordId, StoreError};

/// Worker count used when hardware parallelism cannot be detected.
pub const FALLBACK_THREADS: usize = 4;

/// How long to wait for a single fingerprint.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of hashing workers for this machine.
#[must_use]
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(FALLBACK_THREADS)
}

/// Errors that abort a directory batch.
#[derive(thiserror::Error, Debug)]
pub enum HashingError {
    /// A job did not deliver a result in time.
    #[error("Hashing {path} timed out after {} seconds", timeout.as_secs())]
    Timeout {
        /// File being hashed
        path: PathBuf,
        /// The configured timeout
        timeout: Duration,
    },

    /// The algorithm rejected the file.
    #[error("Failed to hash {path}: {source}")]
    Failed {
        /// File being hashed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: AlgorithmError,
    },

    /// The worker panicked before producing a result.
    #[error("Hashing worker for {0} exited without a result")]
    WorkerLost(PathBuf),

    /// A file could not be added to the store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool could not be created.
    #[error("Failed to start hashing workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration for [`ConcurrentHasher`].
#[derive(Debug, Clone)]
pub struct HasherConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Per-job timeout.
    pub job_timeout: Duration,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl HasherConfig {
    /// Set the worker count (at least one).
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the per-job timeout.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// A fingerprint being computed on the pool.
///
/// Resolves exactly once through [`PendingFingerprint::wait`].
#[derive(Debug)]
pub struct PendingFingerprint {
    path: PathBuf,
    rx: Receiver<Result<Fingerprint, AlgorithmError>>,
}

impl PendingFingerprint {
    /// File this job is hashing.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the result arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns the algorithm error, a timeout, or [`HashingError::WorkerLost`]
    /// if the worker died.
    pub fn wait(self, timeout: Duration) -> Result<Fingerprint, HashingError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(fingerprint)) => Ok(fingerprint),
            Ok(Err(source)) => Err(HashingError::Failed {
                path: self.path,
                source,
            }),
            Err(RecvTimeoutError::Timeout) => Err(HashingError::Timeout {
                path: self.path,
                timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(HashingError::WorkerLost(self.path)),
        }
    }
}

/// What a directory batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Files added to the store
    pub files: usize,
    /// Files skipped because they vanished before they could be read
    pub skipped: usize,
    /// Fingerprints computed and stored
    pub computed: usize,
    /// Files whose record already had a fingerprint
    pub reused: usize,
}

/// Computes missing fingerprints with a bounded worker pool.
pub struct ConcurrentHasher {
    pool: rayon::ThreadPool,
    algorithm: Arc<dyn HashAlgorithm>,
    config: HasherConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for ConcurrentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentHasher")
            .field("algorithm", &self.algorithm.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ConcurrentHasher {
    /// Create a hasher for `algorithm`.
    ///
    /// # Errors
    ///
    /// Fails if the worker pool cannot be started.
    pub fn new(algorithm: Arc<dyn HashAlgorithm>, config: HasherConfig) -> Result<Self, HashingError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .thread_name(|i| format!("imagedups-hash-{i}"))
            .build()?;
        log::debug!(
            "Hashing with {} using {} workers",
            algorithm.name(),
            config.threads.max(1)
        );
        Ok(Self {
            pool,
            algorithm,
            config,
            progress: Arc::new(NoProgress),
        })
    }

    /// Report progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The algorithm this hasher computes.
    #[must_use]
    pub fn algorithm(&self) -> &dyn HashAlgorithm {
        self.algorithm.as_ref()
    }

    /// Queue a fingerprint computation.
    pub fn submit(&self, path: PathBuf) -> PendingFingerprint {
        let (tx, rx) = mpsc::sync_channel(1);
        let algorithm = Arc::clone(&self.algorithm);
        let job_path = path.clone();
        self.pool.spawn(move || {
            match panic::catch_unwind(AssertUnwindSafe(|| algorithm.compute(&job_path))) {
                // The receiver is gone if the batch was abandoned
                Ok(result) => {
                    let _ = tx.send(result);
                }
                Err(_) => log::error!("Hashing worker panicked on {}", job_path.display()),
            }
        });
        PendingFingerprint { path, rx }
    }

    /// Add a directory's images to `store` and compute missing fingerprints.
    ///
    /// Fingerprints are stored as they are collected, so on error everything
    /// before the failing file is kept in `store`. The caller is responsible
    /// for saving the store whether or not this returns an error.
    ///
    /// # Errors
    ///
    /// Returns the first failure in submission order. A file that cannot be
    /// read stops submission; the jobs already submitted are still collected
    /// before the error is returned.
    pub fn hash_directory(
        &self,
        store: &mut HashStore,
        batch: &DirectoryBatch,
        fast: bool,
    ) -> Result<BatchStats, HashingError> {
        let name = self.algorithm.name().to_string();
        let mut stats = BatchStats::default();
        let mut queue: Vec<(RecordId, PendingFingerprint)> = Vec::new();
        let mut add_error = None;

        for path in batch.paths() {
            let id = match store.add(&path, fast) {
                Ok(id) => id,
                Err(StoreError::Checksum(ChecksumError::NotFound(_))) => {
                    log::warn!("{} disappeared before it could be read", path.display());
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    add_error = Some(HashingError::from(e));
                    break;
                }
            };
            stats.files += 1;

            if store.record(id).has_fingerprint(&name) {
                stats.reused += 1;
            } else if queue.iter().any(|(queued, _)| *queued == id) {
                // Same content twice in one directory: one job covers both
                stats.reused += 1;
            } else {
                queue.push((id, self.submit(path)));
            }
        }

        let label = batch.dir.display().to_string();
        self.progress.on_phase_start(&label, queue.len());
        let drained = self.drain(store, queue, &name, &mut stats);
        self.progress.on_phase_end(&label);

        drained?;
        match add_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    /// Apply results in submission order, stopping at the first failure.
    fn drain(
        &self,
        store: &mut HashStore,
        queue: Vec<(RecordId, PendingFingerprint)>,
        name: &str,
        stats: &mut BatchStats,
    ) -> Result<(), HashingError> {
        let total = queue.len();
        for (n, (id, pending)) in queue.into_iter().enumerate() {
            let path = pending.path().display().to_string();
            let fingerprint = pending.wait(self.config.job_timeout).inspect_err(|e| {
                log::warn!("{} (dropping {} queued results)", e, total - n - 1);
            })?;
            store.set_fingerprint(id, name, self.algorithm.encode(&fingerprint));
            stats.computed += 1;
            self.progress.on_progress(n + 1, &path);
        }
        Ok(())
    }
}
