//! Duplicate finder implementation with staged detection.
//!
//! # Overview
//!
//! This module orchestrates the detection pipeline:
//! 1. **Sizing**: stat every candidate and group by size (see [`crate::duplicates::groups`])
//! 2. **Content hashing**: hash every file of each size group concurrently and
//!    group by digest ([`group_by_content`])
//!
//! # Concurrency
//!
//! Hashing fans out over a rayon pool of `io_threads` workers, which bounds
//! the number of files open at once. The pool and the aggregator are created
//! once per run and shared by every size group. Workers never touch shared state: each
//! sends one immutable [`HashMessage`] over a bounded crossbeam channel to a
//! single aggregator thread, which is the only owner of the digest and error
//! maps. Each message carries the input index of its file, so groups are
//! rebuilt in input order no matter which worker finished first.
//!
//! # Example
//!
//! ```no_run
//! use fsdedup::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_min_size(1));
//! let paths = vec![PathBuf::from("a.iso"), PathBuf::from("b.iso")];
//! let report = finder.find_duplicates(&paths).unwrap();
//!
//! println!("{} bytes reclaimable", report.summary.reclaimable_bytes);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use rayon::prelude::*;

use super::groups::{group_paths_by_size, ContentGroup, GroupingStats, SizeGroup};
use crate::actions::cloner::ExtentCloner;
use crate::actions::consolidate::probe_already_shared;
use crate::progress::ProgressCallback;
use crate::scanner::{hash_to_hex, Digest, FileCandidate, HashError, Hasher, ScanError};

/// Default minimum file size: 1 MiB.
pub const DEFAULT_MIN_SIZE: u64 = 1024 * 1024;

/// Default capacity of the worker → aggregator channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Files above this size are logged when hashing starts.
const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024; // 100MB

/// Configuration for the content-hashing stage.
#[derive(Clone)]
pub struct HashConfig {
    /// Number of worker threads, and so the maximum number of files being
    /// read at the same time.
    pub io_threads: usize,
    /// Capacity of the bounded handoff channel.
    pub channel_capacity: usize,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for HashConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashConfig")
            .field("io_threads", &self.io_threads)
            .field("channel_capacity", &self.channel_capacity)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            progress_callback: None,
        }
    }
}

impl HashConfig {
    /// Set the worker count (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the channel capacity (minimum 1).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Statistics from the content-hashing stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashStats {
    /// Files that entered the stage
    pub input_files: usize,
    /// Files hashed successfully
    pub hashed_files: usize,
    /// Files that could not be read
    pub failed_files: usize,
    /// Bytes streamed through the hasher
    pub bytes_hashed: u64,
    /// Digests seen exactly once (eliminated)
    pub unique_digests: usize,
    /// Digest groups with 2+ files
    pub duplicate_groups: usize,
}

/// Result of hashing a batch of candidates.
#[derive(Debug, Default)]
pub struct ContentGrouping {
    /// Digest groups with 2+ members, ordered by their origin's input position
    pub groups: Vec<ContentGroup>,
    /// Files that could not be hashed
    pub errors: BTreeMap<PathBuf, HashError>,
    /// Stage statistics
    pub stats: HashStats,
}

/// One worker result, handed to the aggregator.
#[derive(Debug)]
pub struct HashMessage {
    /// Position of the file in the input
    pub index: usize,
    /// The file that was hashed
    pub file: FileCandidate,
    /// Its digest, or why it could not be computed
    pub result: Result<Digest, HashError>,
}

/// Sole owner of the grouping state while hashing runs.
#[derive(Default)]
struct Aggregator {
    by_content: HashMap<(u64, Digest), Vec<(usize, FileCandidate)>>,
    errors: BTreeMap<PathBuf, HashError>,
    stats: HashStats,
}

impl Aggregator {
    fn run(
        mut self,
        rx: Receiver<HashMessage>,
        callback: Option<&Arc<dyn ProgressCallback>>,
    ) -> Self {
        let mut received = 0usize;
        for message in rx {
            received += 1;
            if let Some(callback) = callback {
                callback.on_progress(received, message.file.path.to_string_lossy().as_ref());
                callback.on_item_completed(message.file.size);
            }
            self.absorb(message);
        }
        self
    }

    fn absorb(&mut self, message: HashMessage) {
        let HashMessage {
            index,
            file,
            result,
        } = message;
        match result {
            Ok(digest) => {
                self.stats.hashed_files += 1;
                self.stats.bytes_hashed += file.size;
                self.by_content
                    .entry((file.size, digest))
                    .or_default()
                    .push((index, file));
            }
            Err(e) => {
                log::warn!("Failed to hash {}: {}", file.path.display(), e);
                self.stats.failed_files += 1;
                self.errors.insert(file.path, e);
            }
        }
    }

    fn finish(mut self) -> ContentGrouping {
        let mut indexed: Vec<(usize, ContentGroup)> = Vec::new();

        for ((_, digest), mut files) in self.by_content {
            if files.len() < 2 {
                self.stats.unique_digests += 1;
                continue;
            }
            files.sort_by_key(|(index, _)| *index);
            let first_index = files[0].0;
            let group = ContentGroup::new(digest, files.into_iter().map(|(_, f)| f).collect());
            log::debug!(
                "Duplicate group {}: {} files, {} bytes each",
                group.digest_hex(),
                group.len(),
                group.size
            );
            indexed.push((first_index, group));
        }

        indexed.sort_by_key(|(index, _)| *index);
        self.stats.duplicate_groups = indexed.len();

        ContentGrouping {
            groups: indexed.into_iter().map(|(_, g)| g).collect(),
            errors: self.errors,
            stats: self.stats,
        }
    }
}

/// Hash every file concurrently and group them by size and digest.
///
/// The whole batch shares one worker pool and one aggregator, so callers
/// should pass every file of a phase in a single call rather than one call
/// per size group.
///
/// Files that fail to hash are left out of every group and reported in
/// [`ContentGrouping::errors`]; one unreadable file never prevents the others
/// from being hashed. Whether a non-empty error map should block
/// consolidation is the caller's decision.
///
/// # Example
///
/// ```no_run
/// use fsdedup::duplicates::{group_by_content, HashConfig};
/// use fsdedup::scanner::{FileCandidate, Hasher};
/// use std::path::Path;
///
/// let files = vec![
///     FileCandidate::from_path(Path::new("a.bin")).unwrap(),
///     FileCandidate::from_path(Path::new("b.bin")).unwrap(),
/// ];
/// let grouping = group_by_content(files, &Hasher::new(), &HashConfig::default());
/// assert!(grouping.errors.is_empty());
/// ```
#[must_use]
pub fn group_by_content(
    files: Vec<FileCandidate>,
    hasher: &Hasher,
    config: &HashConfig,
) -> ContentGrouping {
    let input_files = files.len();
    if files.is_empty() {
        log::debug!("Content hashing: no files to process");
        return ContentGrouping::default();
    }

    let (tx, rx) = bounded::<HashMessage>(config.channel_capacity.max(1));
    let callback = config.progress_callback.as_ref();

    let aggregator = std::thread::scope(|scope| {
        let collector = scope.spawn(move || Aggregator::default().run(rx, callback));

        run_bounded(config.io_threads, || {
            files
                .into_par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (index, file)| {
                    if file.size > LARGE_FILE_THRESHOLD {
                        log::debug!(
                            "Hashing large file ({} MB): {}",
                            file.size / (1024 * 1024),
                            file.path.display()
                        );
                    }
                    let result = hasher.full_hash(&file.path);
                    if let Ok(ref digest) = result {
                        log::trace!("{} {}", hash_to_hex(digest), file.path.display());
                    }
                    if tx
                        .send(HashMessage {
                            index,
                            file,
                            result,
                        })
                        .is_err()
                    {
                        log::error!("Hash aggregator stopped before all results were delivered");
                    }
                });
        });

        // All senders are gone once the parallel loop returns
        collector
            .join()
            .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
    });

    let mut grouping = aggregator.finish();
    grouping.stats.input_files = input_files;
    grouping
}

/// Run `op` on a dedicated pool of `threads` workers.
fn run_bounded<OP>(threads: usize, op: OP)
where
    OP: FnOnce() + Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("fsdedup-hash-{i}"))
        .build()
    {
        Ok(pool) => pool.install(op),
        Err(e) => {
            log::warn!(
                "Failed to create hashing pool ({}), using global pool with {} threads",
                e,
                rayon::current_num_threads()
            );
            op();
        }
    }
}

/// A size group whose consolidation was skipped because hashing failed.
#[derive(Debug)]
pub struct SkippedGroup {
    /// Size shared by the group
    pub size: u64,
    /// Every path in the size group, in input order
    pub files: Vec<PathBuf>,
    /// Hash failures that caused the skip
    pub errors: BTreeMap<PathBuf, HashError>,
}

/// Configuration for the detection pipeline.
#[derive(Clone)]
pub struct FinderConfig {
    /// Files smaller than this are never considered.
    pub min_size: u64,
    /// Digest algorithm; fixed for the whole run.
    pub hasher: Hasher,
    /// Hashing stage configuration.
    pub hash: HashConfig,
    /// Capability used to detect members that already share the origin's
    /// storage. `None` disables the probe.
    pub extent_probe: Option<Arc<dyn ExtentCloner>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("min_size", &self.min_size)
            .field("hasher", &self.hasher)
            .field("hash", &self.hash)
            .field(
                "extent_probe",
                &self.extent_probe.as_ref().map(|c| c.name()),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            hasher: Hasher::new(),
            hash: HashConfig::default(),
            extent_probe: None,
        }
    }
}

impl FinderConfig {
    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the hasher (and so the digest algorithm).
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Set the hashing stage configuration.
    #[must_use]
    pub fn with_hash_config(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }

    /// Probe groups for members that already share the origin's extents.
    #[must_use]
    pub fn with_extent_probe(mut self, probe: Arc<dyn ExtentCloner>) -> Self {
        self.extent_probe = Some(probe);
        self
    }
}

/// Summary of a detection run.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Sizing statistics
    pub grouping: GroupingStats,
    /// Hashing statistics summed over all size groups
    pub hashing: HashStats,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Non-origin members across all groups
    pub duplicate_files: usize,
    /// Members that already share their origin's storage
    pub already_shared: usize,
    /// Size groups skipped because a member could not be hashed
    pub skipped_groups: usize,
    /// Bytes reclaimable by consolidating every pending member
    pub reclaimable_bytes: u64,
    /// Wall time of the detection run
    pub scan_duration: Duration,
}

impl ScanSummary {
    /// Reclaimable bytes in human-readable form.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        bytesize::ByteSize::b(self.reclaimable_bytes).to_string()
    }
}

/// Everything the detection stages produce.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Confirmed duplicate groups, largest size first
    pub groups: Vec<ContentGroup>,
    /// Size groups withheld from consolidation
    pub skipped: Vec<SkippedGroup>,
    /// Run statistics
    pub summary: ScanSummary,
}

impl ScanReport {
    /// Whether any file failed to hash.
    #[must_use]
    pub fn has_hash_errors(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Errors that abort a detection run.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// A candidate could not be stat'ed; the candidate set is invalid.
    #[error(transparent)]
    Metadata(#[from] ScanError),
}

/// Runs sizing and content hashing over a candidate set.
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new finder.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a finder with the default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Find duplicate groups among `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Metadata`] if any path cannot be stat'ed.
    pub fn find_duplicates<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ScanReport, FinderError> {
        let start_time = Instant::now();
        log::info!("Sizing {} candidate path(s)", paths.len());

        let (size_groups, grouping) = group_paths_by_size(paths, self.config.min_size)?;
        let mut report = self.find_in_size_groups(size_groups);
        report.summary.grouping = grouping;
        report.summary.scan_duration = start_time.elapsed();
        Ok(report)
    }

    /// Hash and group already-sized groups, one size group per distinct size.
    ///
    /// Every file of every size group goes through a single hashing pass.
    /// A size group in which any file fails to hash yields no content groups
    /// at all: it is reported in [`ScanReport::skipped`] instead.
    #[must_use]
    pub fn find_in_size_groups(&self, size_groups: Vec<SizeGroup>) -> ScanReport {
        let mut report = ScanReport::default();
        let total: usize = size_groups.iter().map(SizeGroup::len).sum();

        if let Some(ref callback) = self.config.hash.progress_callback {
            callback.on_phase_start("hashing", total);
        }
        log::info!(
            "Hashing {} file(s) in {} size group(s) with {}",
            total,
            size_groups.len(),
            self.config.hasher.algorithm()
        );

        let mut sized: Vec<(u64, Vec<PathBuf>)> = Vec::with_capacity(size_groups.len());
        let mut files = Vec::with_capacity(total);
        for size_group in size_groups {
            sized.push((size_group.size, size_group.paths()));
            files.extend(size_group.files);
        }

        let mut grouping = group_by_content(files, &self.config.hasher, &self.config.hash);
        report.summary.hashing = grouping.stats;

        let mut failed_sizes = HashSet::new();
        for (size, paths) in sized {
            let errors: BTreeMap<PathBuf, HashError> = paths
                .iter()
                .filter_map(|path| grouping.errors.remove_entry(path))
                .collect();
            if errors.is_empty() {
                continue;
            }
            log::warn!(
                "Skipping {} file(s) of {} bytes: {} could not be hashed",
                paths.len(),
                size,
                errors.len()
            );
            failed_sizes.insert(size);
            report.skipped.push(SkippedGroup {
                size,
                files: paths,
                errors,
            });
        }

        for mut group in grouping.groups {
            if failed_sizes.contains(&group.size) {
                continue;
            }
            if let Some(ref probe) = self.config.extent_probe {
                probe_already_shared(probe.as_ref(), &mut group);
            }
            report.groups.push(group);
        }

        if let Some(ref callback) = self.config.hash.progress_callback {
            callback.on_phase_end("hashing");
        }

        let summary = &mut report.summary;
        summary.duplicate_groups = report.groups.len();
        summary.duplicate_files = report.groups.iter().map(|g| g.members().len()).sum();
        summary.already_shared = report.groups.iter().map(|g| g.already_shared.len()).sum();
        summary.reclaimable_bytes = report.groups.iter().map(ContentGroup::reclaimable_bytes).sum();
        summary.skipped_groups = report.skipped.len();

        log::info!(
            "Detection complete: {} groups, {} duplicates, {} bytes reclaimable",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_bytes
        );

        report
    }
}
