//! Layered application configuration.
//!
//! Settings are merged with `figment`, later layers winning:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory
//! 3. `IMAGEDUPS_*` environment variables (e.g. `IMAGEDUPS_THRESHOLD=85`)
//! 4. command-line flags, applied by the caller
//!
//! ```toml
//! algorithm = "gradient"
//! threshold = 85.0
//! viewer = "feh --title {title}"
//! job_timeout_secs = 120
//! ```

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::duplicates::DEFAULT_THRESHOLD;
use crate::hashing::{default_threads, HasherConfig, DEFAULT_JOB_TIMEOUT};
use crate::scanner::perceptual::DEFAULT_ALGORITHM;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "IMAGEDUPS_";

/// File name of the hash database in the cache directory.
pub const DATABASE_FILE_NAME: &str = "imagedups.hashdb";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Perceptual hash algorithm name.
    pub algorithm: String,
    /// Similarity threshold in percent.
    pub threshold: f64,
    /// Viewer command line; `{title}` is replaced by the group title.
    pub viewer: String,
    /// Hash database path.
    pub database: PathBuf,
    /// Hashing worker threads.
    pub threads: usize,
    /// Per-image hashing timeout in seconds.
    pub job_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_ALGORITHM.to_string(),
            threshold: DEFAULT_THRESHOLD,
            viewer: "feh --title {title}".to_string(),
            database: default_database_path(),
            threads: default_threads(),
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Load defaults, the user config file and the environment.
    ///
    /// # Errors
    ///
    /// Fails if the config file or an environment variable holds an invalid
    /// value.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(config_path().as_deref()).extract()
    }

    /// The figment used by [`Config::load`], reading `file` if given.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Apply command-line overrides, the last configuration layer.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(algorithm) = &cli.algorithm {
            self.algorithm.clone_from(algorithm);
        }
        if let Some(threshold) = cli.threshold {
            self.threshold = threshold;
        }
        if let Some(viewer) = &cli.viewer {
            self.viewer.clone_from(viewer);
        }
        if let Some(db) = &cli.db {
            self.database.clone_from(db);
        }
        if let Some(threads) = cli.threads {
            self.threads = threads;
        }
    }

    /// Hasher settings derived from this configuration.
    #[must_use]
    pub fn hasher_config(&self) -> HasherConfig {
        HasherConfig::default()
            .with_threads(self.threads)
            .with_job_timeout(Duration::from_secs(self.job_timeout_secs.max(1)))
    }
}

/// Platform config file path (`.../imagedups/config.toml`).
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default hash database path in the platform cache directory.
///
/// Falls back to the working directory when no home directory is known.
#[must_use]
pub fn default_database_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.cache_dir().join(DATABASE_FILE_NAME),
        None => PathBuf::from(DATABASE_FILE_NAME),
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "imagedups")
}
