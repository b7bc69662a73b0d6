//! Application configuration management.
//!
//! Settings are layered with `figment`, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A TOML file: `--config PATH`, or `config.toml` in the platform
//!    configuration directory when it exists
//! 3. Environment variables prefixed `FSDEDUP_` (e.g. `FSDEDUP_MIN_SIZE=4096`)
//! 4. Command-line flags that were actually given ([`Config::apply_cli`])

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::duplicates::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_MIN_SIZE};
use crate::output::OutputFormat;
use crate::scanner::HashAlgorithm;

/// Prefix of the environment variables read into [`Config`].
pub const ENV_PREFIX: &str = "FSDEDUP_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Files smaller than this many bytes are ignored.
    pub min_size: u64,
    /// Files hashed concurrently.
    pub io_threads: usize,
    /// Capacity of the hash result channel.
    pub channel_capacity: usize,
    /// Content digest algorithm.
    pub algorithm: HashAlgorithm,
    /// Walk directory arguments.
    pub recursive: bool,
    /// Re-check size and mtime right before each clone.
    pub verify_before_clone: bool,
    /// Report only.
    pub dry_run: bool,
    /// Report format.
    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            io_threads: 4,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            algorithm: HashAlgorithm::default(),
            recursive: false,
            verify_before_clone: true,
            dry_run: false,
            output: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Load defaults, file and environment layers.
    ///
    /// An explicit `path` must exist; the default path is skipped when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing, or if any layer
    /// holds a value of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::default_path().filter(|p| p.is_file()),
        };

        if let Some(ref file) = file {
            log::debug!("Loading configuration from {}", file.display());
        }

        let config: Self = Self::figment(file.as_deref())
            .extract()
            .context("Invalid configuration")?;
        Ok(config.normalized())
    }

    /// The layered figment without the CLI layer.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Override fields with the flags present on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(min_size) = cli.min_size {
            self.min_size = min_size;
        }
        if let Some(threads) = cli.io_threads {
            self.io_threads = usize::try_from(threads).unwrap_or(usize::MAX);
        }
        if let Some(capacity) = cli.channel_capacity {
            self.channel_capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        }
        if let Some(algorithm) = cli.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(output) = cli.output {
            self.output = output;
        }
        self.recursive |= cli.recursive;
        self.dry_run |= cli.dry_run;
        if cli.no_verify {
            self.verify_before_clone = false;
        }
        *self = std::mem::take(self).normalized();
    }

    fn normalized(mut self) -> Self {
        self.io_threads = self.io_threads.max(1);
        self.channel_capacity = self.channel_capacity.max(1);
        self
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem operation fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Default platform-specific configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "fsdedup").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
