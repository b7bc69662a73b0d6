//! Human-readable report.
//!
//! Each duplicate group is printed as its files (origin first) followed by a
//! checksum line:
//!
//! ```text
//! /data/a.iso
//! /data/b.iso
//! Checksum (BLAKE3): [9f86d0...]. Size: [1048576] bytes.
//! ```
//!
//! Then come skipped groups, clone failures and the totals.

use std::io::{self, Write};

use yansi::{Condition, Paint};

use super::RunReport;

/// Text formatter for a run.
pub struct TextOutput<'a> {
    report: &'a RunReport<'a>,
    color: Condition,
}

impl<'a> TextOutput<'a> {
    /// Create a formatter; `color` enables ANSI styling.
    #[must_use]
    pub fn new(report: &'a RunReport<'a>, color: bool) -> Self {
        Self {
            report,
            color: if color {
                Condition::ALWAYS
            } else {
                Condition::NEVER
            },
        }
    }

    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let scan = self.report.scan;
        let algorithm = self.report.algorithm.label();

        for group in &scan.groups {
            for file in &group.files {
                if group.is_already_shared(&file.path) {
                    writeln!(
                        writer,
                        "{} {}",
                        file.path.display(),
                        "(already shared)".dim().whenever(self.color)
                    )?;
                } else {
                    writeln!(writer, "{}", file.path.display())?;
                }
            }
            writeln!(
                writer,
                "Checksum ({algorithm}): [{}]. Size: [{}] bytes.",
                group.digest_hex().cyan().whenever(self.color),
                group.size
            )?;
            writeln!(writer)?;
        }

        for skipped in &scan.skipped {
            writeln!(
                writer,
                "{} {} file(s) of {} bytes not consolidated:",
                "Skipped:".yellow().bold().whenever(self.color),
                skipped.files.len(),
                skipped.size
            )?;
            for error in skipped.errors.values() {
                writeln!(writer, "  {error}")?;
            }
        }

        if let Some(batch) = self.report.consolidation {
            for outcome in &batch.outcomes {
                for error in outcome.failures.values() {
                    writeln!(writer, "{} {error}", "Failed:".red().bold().whenever(self.color))?;
                }
            }
        }

        let reclaimable = scan.summary.reclaimable_bytes;
        let label = if self.report.is_dry_run() {
            "Reclaimable"
        } else {
            "Total reclaimable"
        };
        writeln!(
            writer,
            "{label}: {} bytes ({})",
            reclaimable.bold().whenever(self.color),
            scan.summary.reclaimable_display()
        )?;

        if let Some(batch) = self.report.consolidation {
            let summary = batch.summary();
            if batch.all_succeeded() {
                writeln!(writer, "{}", summary.green().whenever(self.color))?;
            } else {
                writeln!(writer, "{}", summary.yellow().whenever(self.color))?;
            }
        } else {
            writeln!(writer, "Dry run: nothing was consolidated")?;
        }

        Ok(())
    }
}
