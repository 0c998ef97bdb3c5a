//! The command pipeline.
//!
//! Commands always run in the same order, whatever order the flags were
//! given in:
//!
//! 1. remove
//! 2. hash
//! 3. cleanup
//! 4. prune
//! 5. search
//!
//! With no command selected, hash, cleanup and search run. Every command that
//! changes the database saves it before returning, including when it fails.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::duplicates::{binary_duplicates, query, similar_groups, Threshold};
use crate::hashing::{BatchStats, ConcurrentHasher, HasherConfig, HashingError};
use crate::output::{binary_title, similar_title, Reporter, QUERY_TITLE};
use crate::progress::{NoProgress, ProgressCallback};
use crate::scanner::{list_directories, HashAlgorithm};
use crate::store::{lifecycle, HashStore, StoreError};
use crate::viewer::{NoopViewer, Viewer};

/// Failures specific to the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    /// Some directories could not be completely hashed.
    #[error("{failed} of {total} directories could not be completely hashed (first failure: {first})")]
    HashingIncomplete {
        /// Directories with a failed batch
        failed: usize,
        /// Directories visited
        total: usize,
        /// The first failure encountered
        #[source]
        first: HashingError,
    },
}

/// Which commands to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandSet {
    /// Drop aliases under a path
    pub remove: bool,
    /// Add images and compute fingerprints
    pub hash: bool,
    /// Drop aliases of missing or modified files
    pub cleanup: bool,
    /// Delete records without aliases
    pub prune: bool,
    /// Report duplicates
    pub search: bool,
}

impl CommandSet {
    /// Whether any command was selected explicitly.
    #[must_use]
    pub fn any(&self) -> bool {
        self.remove || self.hash || self.cleanup || self.prune || self.search
    }

    /// The commands to actually run: the selection, or hash, cleanup and
    /// search when nothing was selected.
    #[must_use]
    pub fn effective(self) -> Self {
        if self.any() {
            self
        } else {
            Self {
                hash: true,
                cleanup: true,
                search: true,
                ..Self::default()
            }
        }
    }

    /// Whether the database must already exist.
    ///
    /// Only hashing can start from an empty database, so the file is required
    /// as soon as any other command is selected explicitly without `hash`.
    #[must_use]
    pub fn requires_database(&self) -> bool {
        self.any() && !self.hash
    }
}

/// Arguments shared by the commands of one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory to work on; `None` means everything in the database
    pub path: Option<PathBuf>,
    /// Descend into subdirectories when hashing or removing
    pub recursive: bool,
    /// Compare only the first bytes of files
    pub fast: bool,
    /// Search for images similar to this file only
    pub sample: Option<PathBuf>,
    /// Do not report binary duplicates
    pub skip_binary: bool,
    /// Show each group in the viewer
    pub view: bool,
    /// Similarity threshold
    pub threshold: Threshold,
}

/// What the search reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Records considered
    pub searched: usize,
    /// Binary duplicate sets reported
    pub binary_sets: usize,
    /// Perceptual groups reported
    pub similar_groups: usize,
    /// Query matches reported
    pub matches: usize,
    /// The viewer asked to stop early
    pub stopped: bool,
}

impl SearchSummary {
    /// Whether anything was reported.
    #[must_use]
    pub fn found_any(&self) -> bool {
        self.binary_sets + self.similar_groups + self.matches > 0
    }
}

/// Totals for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Aliases dropped by remove
    pub removed: usize,
    /// Hashing totals across directories
    pub hashed: BatchStats,
    /// Aliases dropped by cleanup
    pub cleaned: usize,
    /// Records deleted by prune
    pub pruned: usize,
    /// Search results, if a search ran
    pub search: Option<SearchSummary>,
}

/// Load the database at `path`.
///
/// A missing file yields an empty store with a warning unless `must_exist`.
///
/// # Errors
///
/// Fails if the file is required but missing, or exists but cannot be read.
pub fn load_store(path: &Path, must_exist: bool) -> Result<HashStore> {
    match HashStore::load(path) {
        Ok(store) => Ok(store),
        Err(StoreError::NotFound(_)) if !must_exist => {
            log::warn!(
                "Could not read {}, using new empty database",
                path.display()
            );
            Ok(HashStore::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load hash database {}", path.display())),
    }
}

/// Runs commands against one store and saves it after each change.
pub struct Pipeline<'a> {
    store: HashStore,
    db_path: PathBuf,
    algorithm: Arc<dyn HashAlgorithm>,
    hasher_config: HasherConfig,
    progress: Arc<dyn ProgressCallback>,
    reporter: &'a mut dyn Reporter,
    viewer: Box<dyn Viewer + 'a>,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline over `store`, saving to `db_path`.
    pub fn new(
        store: HashStore,
        db_path: PathBuf,
        algorithm: Arc<dyn HashAlgorithm>,
        reporter: &'a mut dyn Reporter,
    ) -> Self {
        Self {
            store,
            db_path,
            algorithm,
            hasher_config: HasherConfig::default(),
            progress: Arc::new(NoProgress),
            reporter,
            viewer: Box::new(NoopViewer),
        }
    }

    /// Use `config` for the hashing workers.
    #[must_use]
    pub fn with_hasher_config(mut self, config: HasherConfig) -> Self {
        self.hasher_config = config;
        self
    }

    /// Report hashing progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Show search results in `viewer`.
    #[must_use]
    pub fn with_viewer(mut self, viewer: Box<dyn Viewer + 'a>) -> Self {
        self.viewer = viewer;
        self
    }

    /// The store in its current state.
    #[must_use]
    pub fn store(&self) -> &HashStore {
        &self.store
    }

    /// Consume the pipeline and return the store.
    #[must_use]
    pub fn into_store(self) -> HashStore {
        self.store
    }

    /// Run `commands` in pipeline order.
    ///
    /// The reporter is finished whether or not a command fails, so whatever
    /// was reported before the failure is still written out.
    ///
    /// # Errors
    ///
    /// Stops at the first failing command. The database has been saved by
    /// then if the failing command changes it.
    pub fn run(&mut self, commands: CommandSet, options: &RunOptions) -> Result<RunSummary> {
        let outcome = self.run_commands(commands.effective(), options);
        let finished = self.reporter.finish();
        let summary = outcome?;
        finished?;
        Ok(summary)
    }

    fn run_commands(&mut self, commands: CommandSet, options: &RunOptions) -> Result<RunSummary> {
        let path = options.path.as_deref();
        let mut summary = RunSummary::default();

        if commands.remove {
            let path = path.context("--remove needs a PATH")?;
            summary.removed = self.remove(path, options.recursive)?;
        }
        if commands.hash {
            summary.hashed = self.hash(path, options.recursive, options.fast)?;
        }
        if commands.cleanup {
            summary.cleaned = self.cleanup(path, options.fast)?;
        }
        if commands.prune {
            summary.pruned = self.prune()?;
        }
        if commands.search {
            summary.search = Some(self.search(options)?);
        }
        Ok(summary)
    }

    /// Save the store, keeping `outcome`'s error if both fail.
    fn persist_after<T>(&self, outcome: Result<T>) -> Result<T> {
        let saved = self
            .store
            .save(&self.db_path)
            .with_context(|| format!("Failed to save hash database {}", self.db_path.display()));
        match (outcome, saved) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(save_err)) => {
                log::error!("{:#}", save_err);
                Err(e)
            }
        }
    }

    /// Drop aliases under `path` and save.
    ///
    /// # Errors
    ///
    /// Fails if the report or the database cannot be written.
    pub fn remove(&mut self, path: &Path, recursive: bool) -> Result<usize> {
        let removed = lifecycle::remove(&mut self.store, path, recursive);
        let reported = removed
            .iter()
            .try_for_each(|r| self.reporter.alias_removed(r))
            .map_err(anyhow::Error::from);
        self.persist_after(reported.map(|()| removed.len()))
    }

    /// Add images under `path` (or every known top-level directory) and
    /// compute missing fingerprints, then save.
    ///
    /// A failing directory does not stop the others; the failures are
    /// reported together once every directory has been visited.
    ///
    /// # Errors
    ///
    /// Fails if a directory cannot be listed, if any directory batch failed,
    /// or if the database cannot be saved.
    pub fn hash(&mut self, path: Option<&Path>, recursive: bool, fast: bool) -> Result<BatchStats> {
        let outcome = self.hash_paths(path, recursive, fast);
        self.persist_after(outcome)
    }

    fn hash_paths(&mut self, path: Option<&Path>, recursive: bool, fast: bool) -> Result<BatchStats> {
        let roots = match path {
            Some(path) => vec![path.to_path_buf()],
            None => self
                .store
                .top_level_paths()
                .into_iter()
                .filter(|p| p.exists())
                .collect(),
        };

        let hasher = ConcurrentHasher::new(Arc::clone(&self.algorithm), self.hasher_config.clone())?
            .with_progress(Arc::clone(&self.progress));

        let mut totals = BatchStats::default();
        let mut failures: Vec<HashingError> = Vec::new();
        let mut visited = 0usize;

        for root in &roots {
            let batches = list_directories(root, recursive)
                .with_context(|| format!("Failed to list {}", root.display()))?;
            for batch in &batches {
                visited += 1;
                log::debug!("Hashing {} ({} images)", batch.dir.display(), batch.files.len());
                match hasher.hash_directory(&mut self.store, batch, fast) {
                    Ok(stats) => {
                        totals.files += stats.files;
                        totals.skipped += stats.skipped;
                        totals.computed += stats.computed;
                        totals.reused += stats.reused;
                    }
                    Err(e) => {
                        log::error!("{}: {}", batch.dir.display(), e);
                        failures.push(e);
                    }
                }
            }
        }

        log::info!(
            "Hashed {} images ({} new fingerprints, {} already known)",
            totals.files,
            totals.computed,
            totals.reused
        );

        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(totals),
            Some(first) => Err(CommandError::HashingIncomplete {
                failed,
                total: visited,
                first,
            }
            .into()),
        }
    }

    /// Drop aliases of missing or modified files and save.
    ///
    /// # Errors
    ///
    /// Fails if the report or the database cannot be written.
    pub fn cleanup(&mut self, path: Option<&Path>, fast: bool) -> Result<usize> {
        let outcome = self
            .reporter
            .checking(path)
            .map_err(anyhow::Error::from)
            .and_then(|()| {
                let removed = lifecycle::cleanup(&mut self.store, path, fast);
                removed
                    .iter()
                    .try_for_each(|r| self.reporter.alias_removed(r))?;
                Ok(removed.len())
            });
        self.persist_after(outcome)
    }

    /// Delete records without aliases and save.
    ///
    /// # Errors
    ///
    /// Fails if the report or the database cannot be written.
    pub fn prune(&mut self) -> Result<usize> {
        let pruned = lifecycle::prune(&mut self.store);
        let reported = self.reporter.pruned(pruned).map_err(anyhow::Error::from);
        self.persist_after(reported.map(|()| pruned))
    }

    /// Report duplicates. Never changes the saved database.
    ///
    /// # Errors
    ///
    /// Fails if the sample cannot be hashed, the viewer cannot be started or
    /// the report cannot be written.
    pub fn search(&mut self, options: &RunOptions) -> Result<SearchSummary> {
        if let Some(path) = &options.path {
            self.store.filter_by_path(path);
        }
        let mut summary = SearchSummary {
            searched: self.store.scoped_records().count(),
            ..SearchSummary::default()
        };
        self.reporter.searching(summary.searched)?;

        if let Some(sample) = &options.sample {
            let fingerprint = self
                .algorithm
                .compute(sample)
                .with_context(|| format!("Failed to hash sample {}", sample.display()))?;
            let matches = query(
                &self.store,
                self.algorithm.as_ref(),
                &fingerprint,
                options.threshold,
            );
            summary.matches = matches.len();
            self.reporter.query_result(sample, &matches)?;
            if options.view {
                let files: Vec<PathBuf> = std::iter::once(sample.clone())
                    .chain(matches.into_iter().map(|m| m.path))
                    .collect();
                summary.stopped = !self.viewer.present(QUERY_TITLE, &files)?;
            }
            return Ok(summary);
        }

        if !options.skip_binary {
            for (n, set) in binary_duplicates(&self.store).iter().enumerate() {
                let number = n + 1;
                summary.binary_sets = number;
                self.reporter.binary_set(number, set)?;
                if options.view && !self.viewer.present(&binary_title(number), &set.paths)? {
                    summary.stopped = true;
                    return Ok(summary);
                }
            }
        }

        let groups = similar_groups(&self.store, self.algorithm.as_ref(), options.threshold);
        for (n, group) in groups.iter().enumerate() {
            let number = n + 1;
            summary.similar_groups = number;
            self.reporter.similar_group(number, group)?;
            if options.view && !self.viewer.present(&similar_title(number), &group.paths())? {
                summary.stopped = true;
                break;
            }
        }
        Ok(summary)
    }
}
