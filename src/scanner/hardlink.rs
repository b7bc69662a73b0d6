//! Hardlink detection for candidate sizing.
//!
//! # Overview
//!
//! Hardlinks are multiple directory entries pointing to the same inode. They
//! already share one copy of the data, so consolidating them is meaningless
//! (and cloning a file onto itself is rejected by most filesystems). The
//! sizing stage records every inode it sees and drops later entries that
//! resolve to an inode already recorded. The same mechanism catches a path
//! given twice on the command line.
//!
//! # Platform Support
//!
//! - **Unix**: Uses (device_id, inode) pairs from file metadata
//! - **Other**: Detection disabled, every entry is treated as distinct
//!
//! # Example
//!
//! ```no_run
//! use fsdedup::scanner::hardlink::HardlinkTracker;
//! use std::path::Path;
//!
//! let mut tracker = HardlinkTracker::new();
//! let path = Path::new("/data/file.bin");
//! let metadata = std::fs::metadata(path).unwrap();
//!
//! if let Some(first) = tracker.observe(path, &metadata) {
//!     println!("{} is a link to {}", path.display(), first.display());
//! }
//! ```

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Tracks seen inodes together with the first path that reached them.
///
/// # Thread Safety
///
/// `HardlinkTracker` is NOT thread-safe. Sizing is sequential, so a single
/// tracker lives for the duration of one sizing pass.
#[derive(Debug, Default)]
pub struct HardlinkTracker {
    seen: HashMap<InodeKey, PathBuf>,
}

impl HardlinkTracker {
    /// Create a new hardlink tracker.
    ///
    /// # Example
    ///
    /// ```
    /// use fsdedup::scanner::hardlink::HardlinkTracker;
    ///
    /// let tracker = HardlinkTracker::new();
    /// assert_eq!(tracker.seen_count(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }

    /// Create a tracker with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashMap::with_capacity(capacity),
        }
    }

    /// Record `path` and report whether its inode was already seen.
    ///
    /// Returns the path that first reached the same inode, or `None` if this
    /// is the first occurrence (or the platform has no inode identity).
    pub fn observe(&mut self, path: &Path, metadata: &Metadata) -> Option<&Path> {
        let key = InodeKey::from_metadata(metadata)?;
        match self.seen.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => Some(entry.into_mut().as_path()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(path.to_path_buf());
                None
            }
        }
    }

    /// Number of distinct inodes recorded.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

/// Platform-specific inode identity. On Unix this is (device_id, inode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InodeKey {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(not(unix))]
    _phantom: (),
}

impl InodeKey {
    #[cfg(unix)]
    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}
