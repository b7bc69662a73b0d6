//! fsdedup - copy-on-write file deduplication
//!
//! Finds files with identical content among a candidate set and consolidates
//! their storage: every duplicate is made to share the data extents of one
//! representative copy through a filesystem clone (reflink), so space is
//! reclaimed while every path, inode, owner and permission stays in place.
//!
//! The pipeline has three stages:
//!
//! 1. [`duplicates::group_paths_by_size`] stats each candidate once and keeps
//!    sizes shared by at least two files
//! 2. [`duplicates::group_by_content`] hashes those files concurrently and
//!    groups them by digest
//! 3. [`actions::ConsolidationEngine`] clones each group's origin onto its
//!    other members

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::actions::{platform_cloner, BatchConsolidation, ConsolidationConfig, ConsolidationEngine};
use crate::cli::Cli;
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, FinderConfig, HashConfig, ScanReport};
use crate::error::ExitCode;
use crate::logging::{init_logging, LogOptions};
use crate::output::{JsonOutput, OutputFormat, RunReport, TextOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::{expand_paths, Hasher};

/// Run the application with parsed command-line arguments.
///
/// # Errors
///
/// Returns an error for fatal conditions: invalid configuration, a path that
/// cannot be expanded or stat'ed, or a failure to write the report. Per-file
/// hash and clone failures are not errors; they are reported and reflected in
/// the returned [`ExitCode`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(LogOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        no_color: cli.no_color,
    });

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    log::debug!("Effective configuration: {:?}", config);

    let paths = expand_paths(&cli.paths, config.recursive).context("Failed to expand paths")?;
    log::info!("{} candidate file(s)", paths.len());

    let show_progress =
        !cli.no_progress && !cli.quiet && config.output == OutputFormat::Text;
    let progress: Arc<dyn ProgressCallback> = Arc::new(Progress::new(!show_progress));
    let cloner = platform_cloner();

    let finder = DuplicateFinder::new(
        FinderConfig::default()
            .with_min_size(config.min_size)
            .with_hasher(Hasher::new().with_algorithm(config.algorithm))
            .with_hash_config(
                HashConfig::default()
                    .with_io_threads(config.io_threads)
                    .with_channel_capacity(config.channel_capacity)
                    .with_progress_callback(Arc::clone(&progress)),
            )
            .with_extent_probe(Arc::clone(&cloner)),
    );
    let report = finder.find_duplicates(&paths).context("Failed to size candidates")?;

    let batch = if config.dry_run {
        log::info!("Dry run: skipping consolidation");
        None
    } else {
        let engine = ConsolidationEngine::new(cloner).with_config(
            ConsolidationConfig::default()
                .with_verify_before_clone(config.verify_before_clone)
                .with_progress_callback(progress),
        );
        Some(engine.consolidate_all(&report.groups))
    };

    let exit_code = determine_exit_code(&report, batch.as_ref());
    let run = RunReport::new(config.algorithm, &report, batch.as_ref(), exit_code);
    let mut stdout = std::io::stdout().lock();

    match config.output {
        OutputFormat::Json => JsonOutput::new(&run)
            .write_to(&mut stdout, true)
            .context("Failed to write JSON report")?,
        OutputFormat::Text => {
            let color = !cli.no_color && std::io::stdout().is_terminal();
            TextOutput::new(&run, color)
                .write_to(&mut stdout)
                .context("Failed to write report")?;
        }
    }

    Ok(exit_code)
}

/// Map the results of a run to its exit code.
#[must_use]
pub fn determine_exit_code(report: &ScanReport, batch: Option<&BatchConsolidation>) -> ExitCode {
    if report.has_hash_errors() || batch.is_some_and(|b| !b.all_succeeded()) {
        ExitCode::PartialSuccess
    } else if report.groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    }
}
