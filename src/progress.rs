//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements [`ProgressCallback`]
//! to display progress bars on stderr for the hashing and cloning phases.

use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress callback for pipeline phases.
///
/// Implement this trait to receive progress updates during hashing and
/// consolidation. Callbacks may be invoked from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase ("hashing" or "cloning")
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsdedup::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            active: Mutex::new(None),
            quiet,
        }
    }

    // Positions count files, so rates are files per second.
    fn bar_template(phase: &str) -> &'static str {
        match phase {
            "hashing" => {
                "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} {per_sec} (ETA: {eta})"
            }
            _ => "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        }
    }

    fn bar_style(phase: &str) -> ProgressStyle {
        ProgressStyle::with_template(Self::bar_template(phase))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn with_active(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(active) = self.active.lock() {
            if let Some(ref pb) = *active {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::bar_style(phase));
        pb.set_message(match phase {
            "hashing" => "Hashing".to_string(),
            "cloning" => "Cloning".to_string(),
            other => other.to_string(),
        });

        if let Ok(mut active) = self.active.lock() {
            if let Some(previous) = active.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }

        let display_msg = truncate_path(path, 30);

        self.with_active(|pb| {
            pb.set_position(current as u64);
            pb.set_message(display_msg);
        });
    }

    fn on_item_completed(&self, bytes: u64) {
        log::trace!("Item completed ({} bytes)", bytes);
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        if let Ok(mut active) = self.active.lock() {
            if let Some(pb) = active.take() {
                pb.finish_with_message(format!("{phase} complete"));
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.len() >= max_len {
        let tail: String = file_name
            .chars()
            .rev()
            .take(max_len.saturating_sub(3))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return format!("...{tail}");
    }

    format!(".../{}", file_name)
}
