//! Command-line interface definitions.
//!
//! Commands are selected with flags and always run in the order remove, hash,
//! cleanup, prune, search. Without any command flag, hash, cleanup and search
//! run.
//!
//! # Example
//!
//! ```bash
//! # Hash a photo tree and report duplicates in it
//! imagedups -r ~/Pictures
//!
//! # Only search, with a looser threshold, showing each group in the viewer
//! imagedups --search -t 80 -x ~/Pictures
//!
//! # Find images similar to one file
//! imagedups --search -f holiday.jpg ~/Pictures
//!
//! # Forget a directory and drop records nothing refers to any more
//! imagedups --remove --prune -r ~/Pictures/old
//! ```

use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use crate::commands::CommandSet;

/// Find duplicate and perceptually similar images.
///
/// Image fingerprints are kept in a hash database so unchanged files are
/// never hashed twice. Renamed or copied files are recognised by content and
/// reuse the stored fingerprints.
#[derive(Debug, Parser)]
#[command(name = "imagedups")]
#[command(author, version, about)]
pub struct Cli {
    /// Directory to hash or search (default: every directory in the database)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Add or update image fingerprints under PATH
    #[arg(long)]
    pub hash: bool,

    /// Report duplicate and similar images
    #[arg(long)]
    pub search: bool,

    /// Remove files under PATH from the database
    #[arg(long, requires = "path")]
    pub remove: bool,

    /// Drop references to deleted or modified files
    #[arg(long)]
    pub cleanup: bool,

    /// Delete database entries without any file references
    #[arg(long)]
    pub prune: bool,

    /// Perceptual hash algorithm (dct, mean, gradient, doublegradient, blockhash, mh)
    #[arg(short, long, value_name = "NAME")]
    pub algorithm: Option<String>,

    /// Minimal similarity in percent for images to be reported together
    #[arg(short, long, value_name = "PERCENT", value_parser = parse_threshold)]
    pub threshold: Option<f64>,

    /// Compare only the first 512 bytes when checking files for changes
    #[arg(short = 'F', long)]
    pub fast: bool,

    /// Search for images similar to this file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub sample: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Show each group in the image viewer
    #[arg(short = 'x', long)]
    pub view: bool,

    /// Viewer command line; `{title}` is replaced by the group title
    #[arg(long, value_name = "COMMAND")]
    pub viewer: Option<String>,

    /// Do not report sets of byte-identical files
    #[arg(long = "skip-bin")]
    pub skip_binary: bool,

    /// Hash database file
    #[arg(long, value_name = "HASHDB")]
    pub db: Option<PathBuf>,

    /// Hashing worker threads
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress bars and all logging except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

impl Cli {
    /// Commands selected by flags.
    #[must_use]
    pub fn commands(&self) -> CommandSet {
        CommandSet {
            remove: self.remove,
            hash: self.hash,
            cleanup: self.cleanup,
            prune: self.prune,
            search: self.search,
        }
    }
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON document
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a similarity percentage in `[0, 100]`.
///
/// # Examples
///
/// ```
/// use imagedups::cli::parse_threshold;
///
/// assert_eq!(parse_threshold("90").unwrap(), 90.0);
/// assert_eq!(parse_threshold("87.5").unwrap(), 87.5);
/// assert!(parse_threshold("101").is_err());
/// ```
///
/// # Errors
///
/// Returns a message for non-numeric or out-of-range input.
pub fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .trim_end_matches('%')
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("threshold must be between 0 and 100, got {value}"))
    }
}

/// Canonicalize `path` if it exists, otherwise return it unchanged.
///
/// A path that no longer exists can still name aliases in the database,
/// e.g. for `--remove`.
#[must_use]
pub fn resolve_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
