//! Expansion of command-line arguments into candidate file paths.
//!
//! # Overview
//!
//! Arguments are resolved the way the CLI documents them:
//!
//! - **Non-recursive**: each argument must be a regular file. A directory is
//!   an error; any other file type (socket, device, FIFO) is skipped with a
//!   log line.
//! - **Recursive**: directories are walked with [`walkdir`]. Regular files are
//!   accepted, directories are descended into, anything else is skipped.
//!
//! Any failure to stat an argument or to read a directory aborts the
//! expansion. Entries inside a directory are visited in file-name order, so
//! the same tree always expands to the same sequence.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::ScanError;

/// Expand `inputs` into a flat list of regular-file paths.
///
/// # Errors
///
/// Returns [`ScanError`] when an argument cannot be stat'ed, a directory is
/// given without `recursive`, or a directory walk fails.
pub fn expand_paths<P: AsRef<Path>>(inputs: &[P], recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
    let mut paths = Vec::new();

    for input in inputs {
        let input = input.as_ref();
        let metadata = std::fs::metadata(input).map_err(|e| ScanError::from_io(input, e))?;

        if metadata.is_file() {
            paths.push(input.to_path_buf());
        } else if metadata.is_dir() {
            if !recursive {
                return Err(ScanError::IsADirectory(input.to_path_buf()));
            }
            walk_directory(input, &mut paths)?;
        } else {
            log::info!("Ignoring {}", input.display());
        }
    }

    log::debug!("Expanded {} argument(s) into {} file(s)", inputs.len(), paths.len());
    Ok(paths)
}

fn walk_directory(root: &Path, paths: &mut Vec<PathBuf>) -> Result<(), ScanError> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(io) => ScanError::from_io(&path, io),
                None => ScanError::Walk(path),
            }
        })?;

        let file_type = entry.file_type();
        if file_type.is_file() {
            paths.push(entry.into_path());
        } else if file_type.is_dir() {
            log::trace!("Descending into {}", entry.path().display());
        } else {
            log::info!("Ignoring {}", entry.path().display());
        }
    }

    Ok(())
}
