//! Command-line interface definitions for fsdedup.
//!
//! Options that also exist in the configuration file are `Option`s here, so
//! a flag only overrides the configured value when it was actually given.
//!
//! # Example
//!
//! ```bash
//! # Consolidate two disk images if their contents match
//! fsdedup a.img b.img
//!
//! # Walk a tree, report only
//! fsdedup -R --dry-run ~/vm-images
//!
//! # Small files too, SHA-256, JSON report
//! fsdedup -R --min-size 4KiB --algorithm sha256 --output json /srv/data
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::output::OutputFormat;
use crate::scanner::HashAlgorithm;

/// Consolidate duplicate files onto shared copy-on-write storage.
///
/// fsdedup groups the given files by size, confirms duplicates by hashing
/// their full contents, and makes every duplicate share the first file's data
/// blocks through a reflink clone. Paths, inodes, ownership and permissions
/// are kept; a cloned file's modification time is updated.
#[derive(Debug, Parser)]
#[command(name = "fsdedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files to consolidate (directories require --recursive)
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Walk directory arguments recursively
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Minimum file size to consider (default: 1MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB.
    /// Empty files are always skipped, even with --min-size 0.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Number of files hashed concurrently (default: 4)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub io_threads: Option<u64>,

    /// Capacity of the hash result channel (default: 32)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub channel_capacity: Option<u64>,

    /// Content digest algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// Report duplicates without consolidating them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the size/mtime re-check before each clone
    #[arg(long)]
    pub no_verify: bool,

    /// Output format for the report
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use fsdedup::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    // Integers stay exact; fractions go through f64
    if let Ok(whole) = num_str.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size too large: '{s}'"));
    }

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;
    Ok((num * multiplier as f64) as u64)
}
