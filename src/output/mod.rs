//! Report formatters for a deduplication run.
//!
//! - [`text`]: human-readable report with optional colour
//! - [`json`]: machine-readable report for scripting
//!
//! # Example
//!
//! ```no_run
//! use fsdedup::duplicates::DuplicateFinder;
//! use fsdedup::error::ExitCode;
//! use fsdedup::output::{RunReport, TextOutput};
//! use fsdedup::scanner::HashAlgorithm;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let scan = finder.find_duplicates(&["a.img", "b.img"]).unwrap();
//! let report = RunReport::new(HashAlgorithm::Blake3, &scan, None, ExitCode::Success);
//!
//! TextOutput::new(&report, false)
//!     .write_to(&mut std::io::stdout())
//!     .unwrap();
//! ```

pub mod json;
pub mod text;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::actions::BatchConsolidation;
use crate::duplicates::ScanReport;
use crate::error::ExitCode;
use crate::scanner::HashAlgorithm;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;

/// Output format for the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
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

/// Everything a formatter needs about one run.
#[derive(Debug, Clone, Copy)]
pub struct RunReport<'a> {
    /// Digest algorithm used for grouping
    pub algorithm: HashAlgorithm,
    /// Detection results
    pub scan: &'a ScanReport,
    /// Consolidation results; `None` for a dry run
    pub consolidation: Option<&'a BatchConsolidation>,
    /// Exit code the run will finish with
    pub exit_code: ExitCode,
}

impl<'a> RunReport<'a> {
    /// Bundle the parts of a run for formatting.
    #[must_use]
    pub fn new(
        algorithm: HashAlgorithm,
        scan: &'a ScanReport,
        consolidation: Option<&'a BatchConsolidation>,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            algorithm,
            scan,
            consolidation,
            exit_code,
        }
    }

    /// Whether consolidation was skipped.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.consolidation.is_none()
    }
}
