//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for fsdedup.
///
/// - 0: Success (duplicates found, every consolidation succeeded)
/// - 1: General error (fatal failure, nothing was consolidated)
/// - 2: No duplicates found
/// - 3: Partial success (some files could not be hashed or cloned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: duplicates were found and handled.
    Success = 0,
    /// General error: an unexpected or fatal error occurred.
    GeneralError = 1,
    /// No duplicates: the run completed but found nothing to consolidate.
    NoDuplicates = 2,
    /// Partial success: the run completed with per-file failures.
    PartialSuccess = 3,
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
            Self::Success => "FD000",
            Self::GeneralError => "FD001",
            Self::NoDuplicates => "FD002",
            Self::PartialSuccess => "FD003",
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "FD001")
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
