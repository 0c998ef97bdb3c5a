//! Diagnostic logging through the `log` facade and `env_logger`.
//!
//! Reports meant for the user (groups, removed files) are written to stdout
//! by [`crate::output`]. Everything here goes to stderr.
//!
//! The level is chosen by, in priority order:
//!
//! 1. `RUST_LOG`, when set
//! 2. `-q` (errors only) or `-v` / `-vv` (debug / trace)
//! 3. info
//!
//! # Example
//!
//! ```rust,no_run
//! use imagedups::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("Hashing with 8 workers");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Install the global logger.
///
/// Calling this a second time logs a debug message and keeps the first
/// logger.
pub fn init_logging(verbose: u8, quiet: bool) {
    let rust_log = env::var("RUST_LOG").ok();

    let mut builder = Builder::new();
    match &rust_log {
        Some(_) => {
            builder.parse_default_env();
        }
        None => {
            builder.filter_level(level_for(verbose, quiet));
        }
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        log::debug!("Logger already installed");
        return;
    }
    match rust_log {
        Some(spec) => log::debug!("Log filter from RUST_LOG: {}", spec),
        None => log::debug!("Log level: {}", current_level_name()),
    }
}

/// Level selected by the `-v` count and `-q` flag. Quiet wins.
fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Debug builds add a timestamp, and the module path when verbose.
/// Release builds print level and message only.
fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    builder.format(move |buf, record| {
        let style = buf.default_level_style(record.level());
        let timestamp = buf.timestamp_seconds();
        match record.module_path().filter(|_| verbose > 0) {
            Some(module) => writeln!(
                buf,
                "{timestamp} {style}{:<5}{style:#} [{module}] {}",
                record.level(),
                record.args()
            ),
            None => writeln!(
                buf,
                "{timestamp} {style}{:<5}{style:#} {}",
                record.level(),
                record.args()
            ),
        }
    });

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let style = buf.default_level_style(record.level());
            writeln!(buf, "{style}{:<5}{style:#} {}", record.level(), record.args())
        });
    }
}

/// Name of the maximum enabled log level.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
