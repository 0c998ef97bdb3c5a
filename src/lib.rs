//! imagedups - find duplicate and perceptually similar images
//!
//! Perceptual fingerprints are cached in a persistent hash database keyed by
//! file content, so a run only hashes images it has not seen before, and
//! renamed or copied images reuse the fingerprints already stored.
//!
//! # Modules
//!
//! - [`scanner`]: directory listing, content checksums, perceptual algorithms
//! - [`store`]: the hash database and its maintenance
//! - [`hashing`]: concurrent fingerprint computation
//! - [`duplicates`]: binary and perceptual grouping, sample queries
//! - [`commands`]: the remove / hash / cleanup / prune / search pipeline

pub mod cli;
pub mod commands;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod store;
pub mod viewer;

use anyhow::{Context, Result};
use std::io;
use std::sync::Arc;

use cli::{resolve_path, Cli, OutputFormat};
use commands::{load_store, Pipeline, RunOptions};
use config::Config;
use duplicates::Threshold;
use error::ExitCode;
use output::{JsonReporter, Reporter, TextReporter};
use progress::Progress;
use scanner::AlgorithmRegistry;
use viewer::ExternalViewer;

/// Run the application for parsed arguments.
///
/// # Errors
///
/// Returns any error that stopped the pipeline. The database has already
/// been saved by the failing command where applicable.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_cli(&cli);
    log::debug!("Configuration: {:?}", config);

    let registry = AlgorithmRegistry::with_defaults();
    let algorithm = registry.get(&config.algorithm)?;
    let threshold = Threshold::new(config.threshold).with_context(|| {
        format!(
            "Threshold must be between 0 and 100, got {}",
            config.threshold
        )
    })?;

    let commands = cli.commands();
    let store = load_store(&config.database, commands.requires_database())?;

    let options = RunOptions {
        path: cli.path.as_deref().map(resolve_path),
        recursive: cli.recursive,
        fast: cli.fast,
        sample: cli.sample.as_deref().map(resolve_path),
        skip_binary: cli.skip_binary,
        view: cli.view,
        threshold,
    };

    let stdout = io::stdout();
    let mut reporter: Box<dyn Reporter> = match cli.output {
        OutputFormat::Text => Box::new(TextReporter::new(stdout.lock())),
        OutputFormat::Json => Box::new(JsonReporter::new(stdout.lock(), true)),
    };

    let mut pipeline = Pipeline::new(store, config.database.clone(), algorithm, reporter.as_mut())
        .with_hasher_config(config.hasher_config())
        .with_progress(Arc::new(Progress::new(cli.quiet)));
    if cli.view {
        pipeline = pipeline.with_viewer(Box::new(ExternalViewer::from_command_line(&config.viewer)?));
    }

    let summary = pipeline.run(commands, &options)?;
    Ok(match summary.search {
        Some(search) if !search.found_any() => ExitCode::NoDuplicates,
        _ => ExitCode::Success,
    })
}
