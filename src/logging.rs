//! Logging setup for fsdedup.
//!
//! Library code logs through the `log` facade only; the binary installs an
//! `env_logger` backend on stderr so that stdout carries nothing but the
//! report. The level comes from, in priority order:
//!
//! 1. `RUST_LOG` (if set)
//! 2. `--quiet` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. Default: info
//!
//! Flag-derived levels apply to this crate only; dependencies are held at
//! `warn` so `-vv` stays readable.
//!
//! # Example
//!
//! ```rust,no_run
//! use fsdedup::logging::{init_logging, LogOptions};
//!
//! init_logging(LogOptions { verbose: 1, ..LogOptions::default() });
//! log::debug!("shown with -v");
//! ```

use env_logger::{Builder, WriteStyle};
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Options derived from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Verbosity count (0=info, 1=debug, 2+=trace)
    pub verbose: u8,
    /// Errors only; wins over `verbose`
    pub quiet: bool,
    /// Never colour the level tags
    pub no_color: bool,
}

/// Initialize the logging subsystem.
///
/// Calling this more than once is harmless: later calls are ignored with a
/// debug message.
pub fn init_logging(options: LogOptions) {
    let from_env = env::var("RUST_LOG").ok();
    let mut builder = Builder::new();

    match from_env {
        Some(ref spec) => {
            builder.parse_filters(spec);
        }
        None => {
            builder
                .filter_level(LevelFilter::Warn)
                .filter_module(env!("CARGO_CRATE_NAME"), determine_level(options));
        }
    }

    builder.write_style(if options.no_color {
        WriteStyle::Never
    } else {
        WriteStyle::Auto
    });
    configure_format(&mut builder, options.verbose);

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
        return;
    }

    match from_env {
        Some(spec) => log::debug!("Logging initialized from RUST_LOG={spec}"),
        None => log::debug!("Logging initialized at level: {}", current_level_name()),
    }
}

/// Level implied by the command-line flags.
fn determine_level(options: LogOptions) -> LevelFilter {
    if options.quiet {
        return LevelFilter::Error;
    }
    match options.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Debug builds: timestamp, level, and (with `-v`) module path.
/// Release builds: level and message.
fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let style = buf.default_level_style(level);

            if verbose >= 1 {
                writeln!(
                    buf,
                    "{timestamp} {style}{level:<5}{style:#} [{}] {}",
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(buf, "{timestamp} {style}{level:<5}{style:#} {}", record.args())
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{level:<5}{style:#} {}", record.args())
        });
    }
}

/// The current maximum log level as a lowercase name.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
