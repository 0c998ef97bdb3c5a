//! Progress reporting utilities using indicatif.
//!
//! The [`ConcurrentHasher`](crate::hashing::ConcurrentHasher) reports one
//! phase per directory batch and one tick per fingerprint applied to the
//! store. [`Progress`] renders that as a progress bar; [`NoProgress`] drops
//! it.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress callback for fingerprint computation.
pub trait ProgressCallback: Send + Sync {
    /// Called when a batch starts.
    ///
    /// # Arguments
    ///
    /// * `label` - What is being processed (usually a directory)
    /// * `total` - Number of fingerprints to compute
    fn on_phase_start(&self, label: &str, total: usize);

    /// Called after each fingerprint has been stored.
    ///
    /// # Arguments
    ///
    /// * `current` - Number of fingerprints stored so far (1-based)
    /// * `path` - File that was just hashed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when a batch ends, successfully or not.
    fn on_phase_end(&self, label: &str);
}

/// Progress sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&self, _label: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _path: &str) {}
    fn on_phase_end(&self, _label: &str) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagedups::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        // A poisoned lock only means a previous update panicked; keep drawing.
        let mut guard = match self.bar.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, label: &str, total: usize) {
        if self.quiet || total == 0 {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(Self::style());
        pb.set_message(truncate_path(label, 30));
        self.with_bar(|bar| *bar = Some(pb));
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        self.with_bar(|bar| {
            if let Some(pb) = bar.as_ref() {
                pb.set_position(current as u64);
                pb.set_message(truncate_path(path, 30));
            }
        });
    }

    fn on_phase_end(&self, _label: &str) {
        self.with_bar(|bar| {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
            }
        });
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
