//! Artifact output.
//!
//! Every artifact goes through [`TabWriter`]: a large `BufWriter` plus an
//! itoa buffer so integer fields are formatted without allocation. Errors are
//! tagged with the destination path by [`write_artifact`].

use crate::error::{HashError, Result};
use crate::parts::Storage;
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::streaming::buffers::DEFAULT_OUTPUT_BUFFER;

/// Suffix of the unsigned hash artifact.
pub const MAP_SUFFIX: &str = ".map";
/// Suffix of the signed hash artifact.
pub const SIGNED_MAP_SUFFIX: &str = ".smap";
/// Suffix of the info record.
pub const INFO_SUFFIX: &str = ".mapinfo";

const SIZE_FIELD: &str = "size";
const UNSIGNED_BITS_FIELD: &str = "unsignedBits";
const SIGNED_WIDTH_FIELD: &str = "signedWidth";

/// Buffered writer for artifacts and `name\tvalue` line output.
pub struct TabWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> TabWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_BUFFER, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    /// Write a `name\tvalue\n` line.
    #[inline]
    pub fn write_field<I: itoa::Integer>(&mut self, name: &str, value: I) -> io::Result<()> {
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(value).as_bytes())?;
        self.writer.write_all(b"\n")
    }

    /// Flush and hand back the underlying output.
    pub fn finish(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl<W: Write> Write for TabWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Create `path` through `storage`, let `body` fill it, then flush.
///
/// Any failure is reported as [`HashError::Write`] for `path`. A partially
/// written file is left behind.
pub fn write_artifact<S, F>(storage: &S, path: &Path, buffer_size: usize, body: F) -> Result<()>
where
    S: Storage + ?Sized,
    F: FnOnce(&mut TabWriter<S::Output>) -> io::Result<()>,
{
    let output = storage
        .create(path)
        .map_err(|e| HashError::write(path, e))?;
    let mut writer = TabWriter::with_capacity(buffer_size, output);
    body(&mut writer).map_err(|e| HashError::write(path, e))?;
    writer.finish().map_err(|e| HashError::write(path, e))?;
    debug!(path = %path.display(), "artifact written");
    Ok(())
}

/// Plain-text summary written next to the hash artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoRecord {
    pub size: u64,
    /// Present only when the unsigned map was written.
    pub unsigned_bits: Option<u64>,
    /// Present only when the signed map was written.
    pub signed_width: Option<u32>,
}

impl InfoRecord {
    pub fn write_to<W: Write>(&self, writer: &mut TabWriter<W>) -> io::Result<()> {
        writer.write_field(SIZE_FIELD, self.size)?;
        if let Some(bits) = self.unsigned_bits {
            writer.write_field(UNSIGNED_BITS_FIELD, bits)?;
        }
        if let Some(width) = self.signed_width {
            writer.write_field(SIGNED_WIDTH_FIELD, width)?;
        }
        Ok(())
    }

    /// Parse the text produced by [`write_to`](Self::write_to).
    pub fn parse(text: &str) -> Result<Self> {
        let mut size = None;
        let mut unsigned_bits = None;
        let mut signed_width = None;

        for line in text.lines().filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once('\t')
                .ok_or_else(|| HashError::Format(format!("Malformed info line: {:?}", line)))?;
            let invalid = |_| HashError::Format(format!("Invalid value for {}: {:?}", name, value));
            match name {
                SIZE_FIELD => size = Some(value.parse::<u64>().map_err(invalid)?),
                UNSIGNED_BITS_FIELD => unsigned_bits = Some(value.parse::<u64>().map_err(invalid)?),
                SIGNED_WIDTH_FIELD => signed_width = Some(value.parse::<u32>().map_err(invalid)?),
                other => {
                    return Err(HashError::Format(format!("Unknown info field: {}", other)));
                }
            }
        }

        Ok(Self {
            size: size.ok_or_else(|| HashError::Format("Missing size field".to_string()))?,
            unsigned_bits,
            signed_width,
        })
    }
}

impl fmt::Display for InfoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}\t{}", SIZE_FIELD, self.size)?;
        if let Some(bits) = self.unsigned_bits {
            writeln!(f, "{}\t{}", UNSIGNED_BITS_FIELD, bits)?;
        }
        if let Some(width) = self.signed_width {
            writeln!(f, "{}\t{}", SIGNED_WIDTH_FIELD, width)?;
        }
        Ok(())
    }
}
