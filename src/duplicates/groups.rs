//! Size grouping and confirmed duplicate groups.
//!
//! # Overview
//!
//! Size grouping is the first stage of the pipeline. Every candidate path is
//! stat'ed exactly once; files below the minimum size are dropped silently,
//! and sizes shared by fewer than two files are discarded because a file with
//! a unique size cannot have a duplicate.
//!
//! [`ContentGroup`] is the output of the hashing stage: files of one size
//! whose full-content digests match. Its first member is the origin that the
//! other members are consolidated onto.
//!
//! # Example
//!
//! ```
//! use fsdedup::scanner::FileCandidate;
//! use fsdedup::duplicates::group_by_size;
//! use std::path::PathBuf;
//!
//! let files = vec![
//!     FileCandidate::new(PathBuf::from("/file1.bin"), 1024, None),
//!     FileCandidate::new(PathBuf::from("/file2.bin"), 1024, None),
//!     FileCandidate::new(PathBuf::from("/file3.bin"), 2048, None),
//! ];
//!
//! let (groups, stats) = group_by_size(files);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(groups.len(), 1);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::scanner::{hash_to_hex, Digest, FileCandidate, HardlinkTracker, ScanError};

/// A group of files with the same size, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeGroup {
    /// File size in bytes (shared by all files in this group)
    pub size: u64,
    /// Files with this exact size
    pub files: Vec<FileCandidate>,
}

impl SizeGroup {
    /// Create a size group with initial files.
    #[must_use]
    pub fn with_files(size: u64, files: Vec<FileCandidate>) -> Self {
        Self { size, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check if this group has potential duplicates (2+ files).
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.files.len() > 1
    }

    /// Paths of the files in this group.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Confirmed duplicate group: same size, same full-content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentGroup {
    /// Content digest shared by every member
    pub digest: Digest,
    /// File size in bytes shared by every member
    pub size: u64,
    /// Members in input order; the first is the origin
    pub files: Vec<FileCandidate>,
    /// Non-origin members that already share the origin's extents
    pub already_shared: Vec<PathBuf>,
}

impl ContentGroup {
    /// Create a group from its digest and members (input order preserved).
    #[must_use]
    pub fn new(digest: Digest, files: Vec<FileCandidate>) -> Self {
        let size = files.first().map_or(0, |f| f.size);
        Self {
            digest,
            size,
            files,
            already_shared: Vec::new(),
        }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The member whose storage every other member will reference.
    #[must_use]
    pub fn origin(&self) -> Option<&FileCandidate> {
        self.files.first()
    }

    /// All members except the origin.
    #[must_use]
    pub fn members(&self) -> &[FileCandidate] {
        self.files.get(1..).unwrap_or_default()
    }

    /// Whether `path` is known to share the origin's storage already.
    #[must_use]
    pub fn is_already_shared(&self, path: &Path) -> bool {
        self.already_shared.iter().any(|p| p == path)
    }

    /// Members that still need consolidation.
    pub fn pending_members(&self) -> impl Iterator<Item = &FileCandidate> {
        self.members()
            .iter()
            .filter(|f| !self.is_already_shared(&f.path))
    }

    /// Bytes reclaimed if every pending member is consolidated.
    ///
    /// Computed before consolidation; it reflects intent, not success.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * self.pending_members().count() as u64
    }

    /// Digest as hexadecimal string.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hash_to_hex(&self.digest)
    }

    /// Paths of all members, origin first.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Statistics from the size grouping stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total number of candidate paths examined
    pub total_files: usize,
    /// Total size of all grouped candidates in bytes
    pub total_size: u64,
    /// Files skipped for being smaller than the threshold
    pub below_threshold: usize,
    /// Empty files skipped (size 0)
    pub empty_files: usize,
    /// Paths skipped because their inode was already seen
    pub hardlinks: usize,
    /// Number of unique file sizes
    pub unique_sizes: usize,
    /// Number of files that could be duplicates (in groups of 2+)
    pub potential_duplicates: usize,
    /// Number of files eliminated as unique (singleton groups)
    pub eliminated_unique: usize,
    /// Number of size groups with 2+ files
    pub duplicate_groups: usize,
}

impl GroupingStats {
    /// Percentage of examined files eliminated before hashing.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            let eliminated = self.total_files - self.potential_duplicates;
            (eliminated as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Group candidates by size, dropping singleton sizes and empty files.
///
/// Insertion order within a group follows input order.
///
/// # Example
///
/// ```
/// use fsdedup::scanner::FileCandidate;
/// use fsdedup::duplicates::group_by_size;
/// use std::path::PathBuf;
///
/// let files = vec![
///     FileCandidate::new(PathBuf::from("/a.bin"), 100, None),
///     FileCandidate::new(PathBuf::from("/b.bin"), 100, None),
///     FileCandidate::new(PathBuf::from("/c.bin"), 200, None),
/// ];
///
/// let (groups, stats) = group_by_size(files);
/// assert_eq!(groups[&100].len(), 2);
/// assert_eq!(stats.eliminated_unique, 1);
/// ```
#[must_use]
pub fn group_by_size(
    files: impl IntoIterator<Item = FileCandidate>,
) -> (HashMap<u64, Vec<FileCandidate>>, GroupingStats) {
    let mut all_groups: HashMap<u64, Vec<FileCandidate>> = HashMap::new();
    let mut stats = GroupingStats::default();

    for file in files {
        stats.total_files += 1;

        // Every empty file shares one digest and owns no extents
        if file.size == 0 {
            stats.empty_files += 1;
            log::debug!("Empty file skipped: {}", file.path.display());
            continue;
        }

        stats.total_size += file.size;
        all_groups.entry(file.size).or_default().push(file);
    }

    stats.unique_sizes = all_groups.len();

    let filtered_groups: HashMap<u64, Vec<FileCandidate>> = all_groups
        .into_iter()
        .filter(|(size, files)| {
            if files.len() == 1 {
                stats.eliminated_unique += 1;
                log::trace!("Eliminated unique size {}: {}", size, files[0].path.display());
                false
            } else {
                stats.potential_duplicates += files.len();
                stats.duplicate_groups += 1;
                log::debug!("Size group {} bytes: {} potential duplicates", size, files.len());
                true
            }
        })
        .collect();

    (filtered_groups, stats)
}

/// Group candidates by size, returning [`SizeGroup`]s sorted largest first.
#[must_use]
pub fn group_by_size_structured(
    files: impl IntoIterator<Item = FileCandidate>,
) -> (Vec<SizeGroup>, GroupingStats) {
    let (groups_map, stats) = group_by_size(files);
    (sort_size_groups(groups_map), stats)
}

/// Stat every path and group the survivors by size (the sizing stage).
///
/// Paths smaller than `min_size` are excluded silently. A path whose inode
/// was already seen (a hardlink or a repeated argument) is excluded too.
///
/// # Errors
///
/// Returns the first [`ScanError`] encountered; a path that cannot be
/// stat'ed invalidates the whole candidate set.
pub fn group_paths_by_size<P: AsRef<Path>>(
    paths: &[P],
    min_size: u64,
) -> Result<(Vec<SizeGroup>, GroupingStats), ScanError> {
    let mut tracker = HardlinkTracker::with_capacity(paths.len());
    let mut candidates = Vec::with_capacity(paths.len());
    let mut below_threshold = 0usize;
    let mut hardlinks = 0usize;

    for path in paths {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| ScanError::from_io(path, e))?;

        if metadata.len() < min_size {
            below_threshold += 1;
            log::trace!("Below threshold ({} bytes): {}", metadata.len(), path.display());
            continue;
        }

        if let Some(first) = tracker.observe(path, &metadata) {
            hardlinks += 1;
            log::debug!(
                "Skipping {}: same inode as {}",
                path.display(),
                first.display()
            );
            continue;
        }

        candidates.push(FileCandidate::from_metadata(path, &metadata));
    }

    log::debug!("{} distinct inode(s) after hardlink filtering", tracker.seen_count());

    let (groups, mut stats) = group_by_size_structured(candidates);
    stats.total_files += below_threshold + hardlinks;
    stats.below_threshold = below_threshold;
    stats.hardlinks = hardlinks;

    log::info!(
        "Sizing complete: {} files → {} potential duplicates in {} size groups ({:.1}% eliminated)",
        stats.total_files,
        stats.potential_duplicates,
        stats.duplicate_groups,
        stats.elimination_rate()
    );

    Ok((groups, stats))
}

fn sort_size_groups(groups: HashMap<u64, Vec<FileCandidate>>) -> Vec<SizeGroup> {
    let mut groups: Vec<SizeGroup> = groups
        .into_iter()
        .map(|(size, files)| SizeGroup::with_files(size, files))
        .collect();
    // Largest first: the biggest savings are reported and consolidated first
    groups.sort_by(|a, b| b.size.cmp(&a.size));
    groups
}
