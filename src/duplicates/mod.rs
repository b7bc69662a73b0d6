//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based file grouping (stage 1)
//! - Concurrent full-content hashing (stage 2)
//! - Duplicate group management

pub mod finder;
pub mod groups;

pub use finder::{
    group_by_content, ContentGrouping, DuplicateFinder, FinderConfig, FinderError, HashConfig,
    HashMessage, HashStats, ScanReport, ScanSummary, SkippedGroup, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_MIN_SIZE,
};
pub use groups::{
    group_by_size, group_by_size_structured, group_paths_by_size, ContentGroup, GroupingStats,
    SizeGroup,
};
