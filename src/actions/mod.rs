//! File actions module.
//!
//! Consolidation makes every confirmed duplicate share its origin's storage
//! through a copy-on-write clone. Each member keeps its path, inode, ownership
//! and permissions; only the data blocks become shared. The kernel updates a
//! cloned member's mtime and ctime.
//!
//! ```no_run
//! use fsdedup::actions::{platform_cloner, ConsolidationEngine};
//! use fsdedup::duplicates::ContentGroup;
//!
//! # fn groups() -> Vec<ContentGroup> { Vec::new() }
//! let engine = ConsolidationEngine::new(platform_cloner());
//! let batch = engine.consolidate_all(&groups());
//! println!("{}", batch.summary());
//! ```

pub mod cloner;
pub mod consolidate;

pub use cloner::{platform_cloner, ExtentCloner, UnsupportedCloner};
#[cfg(target_os = "linux")]
pub use cloner::FicloneCloner;
pub use consolidate::{
    probe_already_shared, BatchConsolidation, CloneError, ConsolidationConfig,
    ConsolidationEngine, ConsolidationOutcome,
};
