//! Streaming full-content hasher.
//!
//! # Overview
//!
//! [`Hasher`] streams a file through the configured digest algorithm in
//! fixed-size chunks, so memory use is independent of file size. Both
//! supported algorithms produce 32-byte digests; a single algorithm is used
//! for a whole run so digests stay comparable.
//!
//! # Example
//!
//! ```no_run
//! use fsdedup::scanner::{hash_to_hex, HashAlgorithm, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new().with_algorithm(HashAlgorithm::Sha256);
//! let digest = hasher.full_hash(Path::new("disk.img")).unwrap();
//! println!("{}", hash_to_hex(&digest));
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use super::HashError;

/// Fixed-width content digest.
pub type Digest = [u8; 32];

/// Default read buffer: 128 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Digest algorithm used for content grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 (fast, default).
    #[default]
    Blake3,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Display name used in reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Blake3 => "BLAKE3",
            Self::Sha256 => "SHA256",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Full-content file hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a BLAKE3 hasher with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Select the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the read buffer size (minimum 4 KiB).
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096);
        self
    }

    /// The configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash the entire content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn full_hash(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.hash_reader(file)
            .map_err(|e| HashError::from_io(path, e))
    }

    /// Hash everything readable from `reader`.
    pub fn hash_reader<R: Read>(&self, reader: R) -> io::Result<Digest> {
        match self.algorithm {
            HashAlgorithm::Blake3 => {
                let mut state = blake3::Hasher::new();
                stream(reader, self.buffer_size, |chunk| {
                    state.update(chunk);
                })?;
                Ok(*state.finalize().as_bytes())
            }
            HashAlgorithm::Sha256 => {
                let mut state = sha2::Sha256::new();
                stream(reader, self.buffer_size, |chunk| state.update(chunk))?;
                Ok(state.finalize().into())
            }
        }
    }

    /// Hash an in-memory byte slice.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> Digest {
        match self.algorithm {
            HashAlgorithm::Blake3 => *blake3::hash(data).as_bytes(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).into(),
        }
    }
}

fn stream<R: Read>(
    mut reader: R,
    buffer_size: usize,
    mut update: impl FnMut(&[u8]),
) -> io::Result<()> {
    let mut buffer = vec![0u8; buffer_size];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Render a digest as lowercase hexadecimal.
#[must_use]
pub fn hash_to_hex(hash: &Digest) -> String {
    use std::fmt::Write;
    hash.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
