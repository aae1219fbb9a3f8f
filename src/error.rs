//! Error type shared by the streaming, construction and output layers.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading key sources or building hashes.
#[derive(Error, Debug)]
pub enum HashError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Read error in {name} at line {line}: {source}")]
    Read {
        name: String,
        line: u64,
        #[source]
        source: io::Error,
    },

    #[error("Line {line} of {name} is not valid {encoding}")]
    Decode {
        name: String,
        line: u64,
        encoding: &'static str,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Duplicate key: {0:?}")]
    DuplicateKey(String),

    #[error("Source {name} changed between passes: expected {expected} lines, read {actual}")]
    SourceChanged {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid hash file: {0}")]
    Format(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("No more lines")]
    EndOfSequence,
}

pub type Result<T> = std::result::Result<T, HashError>;

impl HashError {
    /// Wrap an I/O failure on an output artifact.
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HashError::Write {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised before any source was touched.
    pub fn is_config(&self) -> bool {
        matches!(self, HashError::Config(_))
    }
}
