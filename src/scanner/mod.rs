//! Scanner module for candidate discovery and content hashing.
//!
//! This module provides functionality for:
//! - Expanding command-line arguments into candidate files ([`walker`])
//! - Streaming content hashing with BLAKE3 or SHA-256 ([`hasher`])
//! - Hardlink detection ([`hardlink`])
//!
//! # Example
//!
//! ```no_run
//! use fsdedup::scanner::{expand_paths, FileCandidate};
//!
//! let paths = expand_paths(&["/srv/images"], true).unwrap();
//! for path in paths {
//!     let candidate = FileCandidate::from_path(&path).unwrap();
//!     println!("{}: {} bytes", candidate.path.display(), candidate.size);
//! }
//! ```

pub mod hardlink;
pub mod hasher;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

// Re-export main types
pub use hardlink::HardlinkTracker;
pub use hasher::{hash_to_hex, Digest, HashAlgorithm, Hasher};
pub use walker::expand_paths;

/// A candidate file: its path plus the size observed once from metadata.
///
/// The modification time is kept so the consolidation stage can detect a
/// file that changed after it was hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Path as given (or as produced by recursive expansion)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time, if the platform reports one
    pub modified: Option<SystemTime>,
}

impl FileCandidate {
    /// Create a candidate from already-known values.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }

    /// Build a candidate from existing metadata.
    #[must_use]
    pub fn from_metadata(path: &Path, metadata: &std::fs::Metadata) -> Self {
        Self::new(path.to_path_buf(), metadata.len(), metadata.modified().ok())
    }

    /// Stat `path` and record its size and modification time.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the metadata cannot be read.
    pub fn from_path(path: &Path) -> Result<Self, ScanError> {
        let metadata = std::fs::metadata(path).map_err(|e| ScanError::from_io(path, e))?;
        Ok(Self::from_metadata(path, &metadata))
    }
}

/// Errors while resolving or sizing candidates. Always fatal for a run.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A directory was given where a file was expected.
    #[error("{0} is a directory")]
    IsADirectory(PathBuf),

    /// Directory traversal failed without an underlying I/O error (e.g. a loop).
    #[error("Directory walk failed at {0}")]
    Walk(PathBuf),

    /// Any other I/O error while reading metadata.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error raised for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing. Recoverable per file.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
