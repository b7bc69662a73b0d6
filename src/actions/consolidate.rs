//! Consolidation of confirmed duplicate groups through extent sharing.
//!
//! # Overview
//!
//! For each [`ContentGroup`] the engine opens the origin (first member)
//! read-only once, then opens every other member for writing and asks the
//! [`ExtentCloner`] to make it reference the origin's extents. Failures are
//! recorded per path and never stop the remaining members or groups.
//!
//! The engine trusts the digest match established by the hashing stage and
//! performs no content comparison of its own. With verification enabled it
//! does compare size and modification time, read from the already opened
//! handles, against the values recorded when the file was sized; a file that
//! changed since then is refused instead of being overwritten with stale
//! content.
//!
//! # Safety
//!
//! Consolidation is irreversible, but it never changes what readers see:
//! on success the destination's logical content is bit-identical and only
//! its physical storage is shared with the origin until either is modified.
//!
//! # Example
//!
//! ```no_run
//! use fsdedup::actions::{platform_cloner, ConsolidationEngine};
//! # use fsdedup::duplicates::ContentGroup;
//! # let groups: Vec<ContentGroup> = Vec::new();
//!
//! let engine = ConsolidationEngine::new(platform_cloner());
//! let batch = engine.consolidate_all(&groups);
//! println!("{}", batch.summary());
//! ```

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::cloner::ExtentCloner;
use crate::duplicates::ContentGroup;
use crate::progress::ProgressCallback;
use crate::scanner::FileCandidate;

/// Why a member could not be consolidated.
#[derive(Debug, Error)]
pub enum CloneError {
    /// The origin could not be opened, so no member of the group was touched.
    #[error("origin {origin} unavailable: {message}")]
    OriginUnavailable { origin: PathBuf, message: String },

    /// The origin changed since it was hashed.
    #[error("origin modified since hashing: {0}")]
    OriginModified(PathBuf),

    /// The member changed since it was hashed.
    #[error("file modified since hashing: {0}")]
    Modified(PathBuf),

    /// Permission denied when opening or cloning.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Member and origin live on different filesystems.
    #[error("{path} is on a different filesystem than {origin}")]
    CrossDevice { path: PathBuf, origin: PathBuf },

    /// The filesystem has no extent-sharing support.
    #[error("extent sharing not supported for {0}")]
    Unsupported(PathBuf),

    /// The member could not be opened for writing.
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other failure reported by the clone operation.
    #[error("clone failed for {path}: {source}")]
    Failed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CloneError {
    /// Classify an error returned by the clone primitive.
    #[must_use]
    pub fn from_clone_io(path: &Path, origin: &Path, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied(path.to_path_buf());
        }
        if error.kind() == io::ErrorKind::Unsupported {
            return Self::Unsupported(path.to_path_buf());
        }

        if let Some(classified) = classify_errno(path, origin, &error) {
            return classified;
        }

        Self::Failed {
            path: path.to_path_buf(),
            source: error,
        }
    }

    fn from_open_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Open {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

#[cfg(unix)]
fn classify_errno(path: &Path, origin: &Path, error: &io::Error) -> Option<CloneError> {
    match error.raw_os_error()? {
        libc::EXDEV => Some(CloneError::CrossDevice {
            path: path.to_path_buf(),
            origin: origin.to_path_buf(),
        }),
        code if code == libc::EOPNOTSUPP || code == libc::ENOTTY || code == libc::ENOSYS => {
            Some(CloneError::Unsupported(path.to_path_buf()))
        }
        _ => None,
    }
}

#[cfg(not(unix))]
fn classify_errno(_path: &Path, _origin: &Path, _error: &io::Error) -> Option<CloneError> {
    None
}

/// Result of consolidating one content group.
///
/// A non-origin path that is absent from `failures` was consolidated (or
/// already shared the origin's storage).
#[derive(Debug)]
pub struct ConsolidationOutcome {
    /// The origin every member was pointed at
    pub origin: PathBuf,
    /// File size shared by the group
    pub size: u64,
    /// Members that now share the origin's extents
    pub cloned: Vec<PathBuf>,
    /// Members skipped because they already shared the origin's extents
    pub already_shared: Vec<PathBuf>,
    /// Members that could not be consolidated, with the reason
    pub failures: BTreeMap<PathBuf, CloneError>,
}

impl ConsolidationOutcome {
    fn new(origin: PathBuf, size: u64) -> Self {
        Self {
            origin,
            size,
            cloned: Vec::new(),
            already_shared: Vec::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Whether every pending member was consolidated.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Bytes now shared instead of duplicated.
    #[must_use]
    pub fn bytes_shared(&self) -> u64 {
        self.size * self.cloned.len() as u64
    }
}

/// Results of consolidating many groups.
#[derive(Debug, Default)]
pub struct BatchConsolidation {
    /// One outcome per group, in the order the groups were given
    pub outcomes: Vec<ConsolidationOutcome>,
}

impl BatchConsolidation {
    /// Members consolidated across all groups.
    #[must_use]
    pub fn cloned_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.cloned.len()).sum()
    }

    /// Members that failed across all groups.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.failures.len()).sum()
    }

    /// Members skipped because they were already shared.
    #[must_use]
    pub fn already_shared_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.already_shared.len()).sum()
    }

    /// Total bytes now shared instead of duplicated.
    #[must_use]
    pub fn bytes_shared(&self) -> u64 {
        self.outcomes.iter().map(ConsolidationOutcome::bytes_shared).sum()
    }

    /// Check if all consolidations succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ConsolidationOutcome::is_success)
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            format!(
                "Consolidated {} file(s), {} bytes now shared",
                self.cloned_count(),
                self.bytes_shared()
            )
        } else {
            format!(
                "Consolidated {} file(s), {} failed, {} bytes now shared",
                self.cloned_count(),
                self.failure_count(),
                self.bytes_shared()
            )
        }
    }
}

/// Configuration for the consolidation engine.
#[derive(Clone)]
pub struct ConsolidationConfig {
    /// Refuse members whose size or mtime changed since they were sized.
    pub verify_before_clone: bool,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ConsolidationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsolidationConfig")
            .field("verify_before_clone", &self.verify_before_clone)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            verify_before_clone: true,
            progress_callback: None,
        }
    }
}

impl ConsolidationConfig {
    /// Enable or disable the pre-clone size/mtime check.
    #[must_use]
    pub fn with_verify_before_clone(mut self, verify: bool) -> Self {
        self.verify_before_clone = verify;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Makes duplicate files share their origin's storage.
pub struct ConsolidationEngine {
    cloner: Arc<dyn ExtentCloner>,
    config: ConsolidationConfig,
}

impl ConsolidationEngine {
    /// Create an engine using `cloner` and the default configuration.
    #[must_use]
    pub fn new(cloner: Arc<dyn ExtentCloner>) -> Self {
        Self {
            cloner,
            config: ConsolidationConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ConsolidationConfig) -> Self {
        self.config = config;
        self
    }

    /// Consolidate every pending member of `group` onto its origin.
    #[must_use]
    pub fn consolidate(&self, group: &ContentGroup) -> ConsolidationOutcome {
        let mut attempted = 0;
        self.consolidate_counted(group, &mut attempted)
    }

    fn consolidate_counted(&self, group: &ContentGroup, attempted: &mut usize) -> ConsolidationOutcome {
        let Some(origin) = group.origin() else {
            return ConsolidationOutcome::new(PathBuf::new(), group.size);
        };
        let mut outcome = ConsolidationOutcome::new(origin.path.clone(), group.size);
        outcome.already_shared = group
            .members()
            .iter()
            .filter(|m| group.is_already_shared(&m.path))
            .map(|m| m.path.clone())
            .collect();

        let origin_file = match self.open_origin(origin) {
            Ok(file) => file,
            Err(reason) => {
                log::warn!("Skipping group of {}: {}", origin.path.display(), reason);
                for member in group.pending_members() {
                    outcome
                        .failures
                        .insert(member.path.clone(), reason.for_member());
                }
                return outcome;
            }
        };

        for member in group.pending_members() {
            *attempted += 1;
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_progress(*attempted, member.path.to_string_lossy().as_ref());
            }

            match self.clone_member(&origin_file, origin, member) {
                Ok(()) => {
                    log::info!(
                        "Consolidated {} onto {} ({} bytes)",
                        member.path.display(),
                        origin.path.display(),
                        group.size
                    );
                    outcome.cloned.push(member.path.clone());
                }
                Err(e) => {
                    log::warn!("Failed to consolidate {}: {}", member.path.display(), e);
                    outcome.failures.insert(member.path.clone(), e);
                }
            }

            if let Some(ref callback) = self.config.progress_callback {
                callback.on_item_completed(group.size);
            }
        }

        outcome
    }

    /// Consolidate every group, continuing past failures.
    #[must_use]
    pub fn consolidate_all(&self, groups: &[ContentGroup]) -> BatchConsolidation {
        let pending: usize = groups.iter().map(|g| g.pending_members().count()).sum();
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("cloning", pending);
        }

        log::info!(
            "Consolidating {} file(s) in {} group(s) with {}",
            pending,
            groups.len(),
            self.cloner.name()
        );

        let mut attempted = 0;
        let batch = BatchConsolidation {
            outcomes: groups
                .iter()
                .map(|g| self.consolidate_counted(g, &mut attempted))
                .collect(),
        };

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("cloning");
        }

        log::info!("{}", batch.summary());
        batch
    }

    fn open_origin(&self, origin: &FileCandidate) -> Result<File, OriginFailure> {
        let file = File::open(&origin.path).map_err(|e| OriginFailure::Unavailable {
            origin: origin.path.clone(),
            message: e.to_string(),
        })?;
        if self.config.verify_before_clone && !is_unchanged(origin, &file) {
            return Err(OriginFailure::Modified(origin.path.clone()));
        }
        Ok(file)
    }

    fn clone_member(
        &self,
        origin_file: &File,
        origin: &FileCandidate,
        member: &FileCandidate,
    ) -> Result<(), CloneError> {
        let dest = OpenOptions::new()
            .write(true)
            .open(&member.path)
            .map_err(|e| CloneError::from_open_io(&member.path, e))?;

        if self.config.verify_before_clone && !is_unchanged(member, &dest) {
            return Err(CloneError::Modified(member.path.clone()));
        }

        self.cloner
            .clone_extents(origin_file, &dest)
            .map_err(|e| CloneError::from_clone_io(&member.path, &origin.path, e))
    }
}

/// Mark members of `group` that already share the origin's extents.
///
/// Probe failures are treated as "not shared"; the member is then simply
/// consolidated again.
pub fn probe_already_shared(cloner: &dyn ExtentCloner, group: &mut ContentGroup) {
    let Some(origin) = group.origin() else {
        return;
    };
    let origin_file = match File::open(&origin.path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("Cannot probe {}: {}", origin.path.display(), e);
            return;
        }
    };

    let shared: Vec<PathBuf> = group
        .members()
        .iter()
        .filter(|member| {
            let result = File::open(&member.path)
                .and_then(|file| cloner.shares_extents(&origin_file, &file));
            match result {
                Ok(shared) => shared,
                Err(e) => {
                    log::debug!("Extent probe failed for {}: {}", member.path.display(), e);
                    false
                }
            }
        })
        .map(|member| member.path.clone())
        .collect();

    if !shared.is_empty() {
        log::debug!(
            "{} member(s) already share extents with {}",
            shared.len(),
            origin.path.display()
        );
    }
    group.already_shared = shared;
}

enum OriginFailure {
    Unavailable { origin: PathBuf, message: String },
    Modified(PathBuf),
}

impl OriginFailure {
    fn for_member(&self) -> CloneError {
        match self {
            Self::Unavailable { origin, message } => CloneError::OriginUnavailable {
                origin: origin.clone(),
                message: message.clone(),
            },
            Self::Modified(origin) => CloneError::OriginModified(origin.clone()),
        }
    }
}

impl std::fmt::Display for OriginFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.for_member())
    }
}

/// Compare an open file against the size and mtime recorded at sizing.
fn is_unchanged(recorded: &FileCandidate, file: &File) -> bool {
    let Ok(current) = file.metadata() else {
        return false;
    };
    if current.len() != recorded.size {
        log::warn!(
            "File modified since hashing: {} (size changed from {} to {})",
            recorded.path.display(),
            recorded.size,
            current.len()
        );
        return false;
    }
    if let (Some(before), Ok(now)) = (recorded.modified, current.modified()) {
        if before != now {
            log::warn!(
                "File modified since hashing: {} (mtime changed)",
                recorded.path.display()
            );
            return false;
        }
    }
    true
}
