//! Structured error handling and exit codes.

use serde::Serialize;

use crate::commands::CommandError;

/// Exit codes for the imagedups application.
///
/// - 0: Success (completed normally, duplicates reported or nothing searched)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (search completed, nothing to report)
/// - 3: Hashing incomplete (some directories failed; progress was saved)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: all commands completed.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: Search completed but found nothing.
    NoDuplicates = 2,
    /// Hashing incomplete: at least one directory could not be fully hashed.
    HashingIncomplete = 3,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "ID000",
            Self::GeneralError => "ID001",
            Self::NoDuplicates => "ID002",
            Self::HashingIncomplete => "ID003",
        }
    }

    /// Exit code for an error returned by the application.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<CommandError>() {
            Some(CommandError::HashingIncomplete { .. }) => Self::HashingIncomplete,
            None => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "ID001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}
