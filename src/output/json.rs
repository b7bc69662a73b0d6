//! JSON output formatter for deduplication runs.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "algorithm": "BLAKE3",
//!   "dry_run": false,
//!   "groups": [
//!     {
//!       "digest": "abc123...",
//!       "size": 1048576,
//!       "origin": "/data/a.iso",
//!       "members": ["/data/b.iso", "/data/c.iso"],
//!       "already_shared": [],
//!       "reclaimable_bytes": 2097152
//!     }
//!   ],
//!   "skipped": [
//!     { "size": 4096, "files": ["..."], "errors": { "/data/x": "Permission denied: /data/x" } }
//!   ],
//!   "outcomes": [
//!     { "origin": "/data/a.iso", "cloned": ["/data/b.iso"], "already_shared": [], "failures": {} }
//!   ],
//!   "summary": { "reclaimable_bytes": 2097152, "exit_code": 0, "exit_code_name": "FD000", ... }
//! }
//! ```
//!
//! Paths are reported as given, never canonicalized: a member's path is its
//! identity, and resolving symlinks would report a different file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::RunReport;
use crate::actions::ConsolidationOutcome;
use crate::duplicates::{ContentGroup, SkippedGroup};

/// One confirmed duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Content digest as hexadecimal (64 characters)
    pub digest: String,
    /// File size in bytes
    pub size: u64,
    /// The file every member is consolidated onto
    pub origin: String,
    /// Every other file of the group, in input order
    pub members: Vec<String>,
    /// Members already sharing the origin's storage
    pub already_shared: Vec<String>,
    /// Bytes reclaimable by consolidating this group
    pub reclaimable_bytes: u64,
}

impl JsonGroup {
    fn from_group(group: &ContentGroup) -> Self {
        Self {
            digest: group.digest_hex(),
            size: group.size,
            origin: group
                .origin()
                .map(|o| path_string(&o.path))
                .unwrap_or_default(),
            members: group.members().iter().map(|m| path_string(&m.path)).collect(),
            already_shared: group.already_shared.iter().map(|p| path_string(p)).collect(),
            reclaimable_bytes: group.reclaimable_bytes(),
        }
    }
}

/// A size group withheld from consolidation.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSkippedGroup {
    /// File size in bytes
    pub size: u64,
    /// Every file of the size group
    pub files: Vec<String>,
    /// Hash failures, path → message
    pub errors: BTreeMap<String, String>,
}

impl JsonSkippedGroup {
    fn from_skipped(skipped: &SkippedGroup) -> Self {
        Self {
            size: skipped.size,
            files: skipped.files.iter().map(|p| path_string(p)).collect(),
            errors: messages(&skipped.errors),
        }
    }
}

/// Consolidation result for one group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutcome {
    /// The origin of the group
    pub origin: String,
    /// File size in bytes
    pub size: u64,
    /// Members now sharing the origin's extents
    pub cloned: Vec<String>,
    /// Members that already did
    pub already_shared: Vec<String>,
    /// Failed members, path → message
    pub failures: BTreeMap<String, String>,
}

impl JsonOutcome {
    fn from_outcome(outcome: &ConsolidationOutcome) -> Self {
        Self {
            origin: path_string(&outcome.origin),
            size: outcome.size,
            cloned: outcome.cloned.iter().map(|p| path_string(p)).collect(),
            already_shared: outcome.already_shared.iter().map(|p| path_string(p)).collect(),
            failures: messages(&outcome.failures),
        }
    }
}

/// Summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Candidate paths examined
    pub total_files: usize,
    /// Files below the minimum size
    pub below_threshold: usize,
    /// Empty files skipped
    pub empty_files: usize,
    /// Paths skipped as hardlinks of earlier paths
    pub hardlinks: usize,
    /// Files hashed successfully
    pub hashed_files: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Non-origin members
    pub duplicate_files: usize,
    /// Size groups skipped after hash failures
    pub skipped_groups: usize,
    /// Bytes reclaimable by consolidation
    pub reclaimable_bytes: u64,
    /// Members consolidated in this run
    pub cloned_files: usize,
    /// Members that failed to consolidate
    pub failed_files: usize,
    /// Bytes now shared thanks to this run
    pub bytes_shared: u64,
    /// Detection duration in milliseconds
    pub scan_duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "FD000")
    pub exit_code_name: String,
}

impl JsonSummary {
    fn from_report(report: &RunReport<'_>) -> Self {
        let summary = &report.scan.summary;
        let batch = report.consolidation;
        Self {
            total_files: summary.grouping.total_files,
            below_threshold: summary.grouping.below_threshold,
            empty_files: summary.grouping.empty_files,
            hardlinks: summary.grouping.hardlinks,
            hashed_files: summary.hashing.hashed_files,
            bytes_hashed: summary.hashing.bytes_hashed,
            duplicate_groups: summary.duplicate_groups,
            duplicate_files: summary.duplicate_files,
            skipped_groups: summary.skipped_groups,
            reclaimable_bytes: summary.reclaimable_bytes,
            cloned_files: batch.map_or(0, |b| b.cloned_count()),
            failed_files: batch.map_or(0, |b| b.failure_count()),
            bytes_shared: batch.map_or(0, |b| b.bytes_shared()),
            scan_duration_ms: u64::try_from(summary.scan_duration.as_millis()).unwrap_or(u64::MAX),
            exit_code: report.exit_code.as_i32(),
            exit_code_name: report.exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Digest algorithm label
    pub algorithm: String,
    /// Whether consolidation was skipped
    pub dry_run: bool,
    /// Confirmed duplicate groups
    pub groups: Vec<JsonGroup>,
    /// Size groups withheld after hash failures
    pub skipped: Vec<JsonSkippedGroup>,
    /// Consolidation results (empty on a dry run)
    pub outcomes: Vec<JsonOutcome>,
    /// Summary statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the JSON document for a run.
    #[must_use]
    pub fn new(report: &RunReport<'_>) -> Self {
        Self {
            algorithm: report.algorithm.label().to_string(),
            dry_run: report.is_dry_run(),
            groups: report.scan.groups.iter().map(JsonGroup::from_group).collect(),
            skipped: report
                .scan
                .skipped
                .iter()
                .map(JsonSkippedGroup::from_skipped)
                .collect(),
            outcomes: report
                .consolidation
                .map(|b| b.outcomes.iter().map(JsonOutcome::from_outcome).collect())
                .unwrap_or_default(),
            summary: JsonSummary::from_report(report),
        }
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            serde_json::to_string(self)?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn messages<E: std::fmt::Display>(errors: &BTreeMap<PathBuf, E>) -> BTreeMap<String, String> {
    errors
        .iter()
        .map(|(path, e)| (path_string(path), e.to_string()))
        .collect()
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
