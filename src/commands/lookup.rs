//! Key lookup against a written artifact.
//!
//! Reads one key per line and prints `key\tindex`, or `key\t-1` when the
//! artifact rejects the key. Unsigned maps only reject keys that miss every
//! level and the fallback table; signed maps reject foreign keys reliably.

use crate::config::Encoding;
use crate::error::{HashError, Result};
use crate::mph::Artifact;
use crate::output::TabWriter;
use crate::streaming::buffers::{DEFAULT_INPUT_BUFFER, DEFAULT_OUTPUT_BUFFER};
use crate::streaming::LineCursor;
use std::io::{Read, Write};

/// Lookup configuration.
#[derive(Debug, Clone)]
pub struct LookupCommand {
    /// Encoding of the key input.
    pub encoding: Encoding,
}

impl Default for LookupCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupCommand {
    pub fn new() -> Self {
        Self {
            encoding: Encoding::utf8(),
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Look up every line of `input` in `artifact`.
    pub fn run<R: Read, W: Write>(
        &self,
        artifact: &Artifact,
        name: &str,
        input: R,
        output: &mut W,
    ) -> Result<LookupStats> {
        let mut stats = LookupStats::default();
        let mut keys = LineCursor::with_capacity(name, input, self.encoding, DEFAULT_INPUT_BUFFER);
        let mut writer = TabWriter::with_capacity(DEFAULT_OUTPUT_BUFFER, output);

        while let Some(key) = keys.try_next()? {
            stats.keys += 1;
            let written = match artifact.get(key) {
                Some(index) => {
                    stats.found += 1;
                    writer.write_field(key, index)
                }
                None => writer.write_field(key, -1i64),
            };
            written?;
        }

        writer.finish()?;
        Ok(stats)
    }
}

/// Statistics from a lookup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Keys read
    pub keys: u64,
    /// Keys the artifact accepted
    pub found: u64,
}

impl std::fmt::Display for LookupStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keys: {}, Found: {}", self.keys, self.found)
    }
}

/// Open `path` and look up `keys`, `None` where the artifact rejects a key.
pub fn lookup_keys<'a, I>(path: &str, keys: I) -> Result<Vec<Option<u64>>>
where
    I: IntoIterator<Item = &'a str>,
{
    let artifact = Artifact::open(path).map_err(|e| match e {
        HashError::Io(source) => HashError::Open {
            name: path.to_string(),
            source,
        },
        other => other,
    })?;
    Ok(keys.into_iter().map(|key| artifact.get(key)).collect())
}
