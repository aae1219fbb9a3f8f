//! Hash construction driver.
//!
//! Builds the hash artifacts for one source name:
//!
//! 1. Resolve the name into a re-openable part stream through [`Storage`]
//! 2. Build the [`OrderedHash`] in several passes over the lines
//! 3. Write `<base>.map` when signing is off or the unsigned map is kept
//! 4. Sign with one more pass and write `<base>.smap` when a width is set
//! 5. Write `<base>.mapinfo` when requested
//!
//! `<base>` is the source name without compression suffix. Artifacts that
//! were already written stay in place when a later step fails.

use crate::config::{check_signature_width, Encoding, DEFAULT_SEED};
use crate::error::{HashError, Result};
use crate::mph::{OrderedHashBuilder, Persist, SignedHash};
use crate::output::{write_artifact, InfoRecord, INFO_SUFFIX, MAP_SUFFIX, SIGNED_MAP_SUFFIX};
use crate::parts::Storage;
use crate::streaming::buffers::BufferSizes;
use crate::streaming::LineCollection;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Hash construction configuration.
#[derive(Debug, Clone)]
pub struct ComputeHashCommand {
    /// Signature width in bits; zero or less disables signing.
    pub signature_width: i32,
    /// Also write the unsigned map when signing.
    pub keep_unsigned: bool,
    /// Character encoding of the source lines.
    pub encoding: Encoding,
    /// Write the `.mapinfo` record.
    pub write_info: bool,
    /// Fingerprint seed.
    pub seed: u64,
    /// Use smaller I/O buffers.
    pub low_memory: bool,
}

impl Default for ComputeHashCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeHashCommand {
    pub fn new() -> Self {
        Self {
            signature_width: 0,
            keep_unsigned: false,
            encoding: Encoding::utf8(),
            write_info: false,
            seed: DEFAULT_SEED,
            low_memory: false,
        }
    }

    pub fn with_signature_width(mut self, width: i32) -> Self {
        self.signature_width = width;
        self
    }

    pub fn with_keep_unsigned(mut self, keep: bool) -> Self {
        self.keep_unsigned = keep;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_write_info(mut self, write: bool) -> Self {
        self.write_info = write;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_low_memory(mut self, low_memory: bool) -> Self {
        self.low_memory = low_memory;
        self
    }

    /// True if a `.smap` will be written.
    pub fn signs(&self) -> bool {
        self.signature_width > 0
    }

    /// True if a `.map` will be written.
    pub fn writes_unsigned(&self) -> bool {
        !self.signs() || self.keep_unsigned
    }

    /// Reject settings that cannot work for any source.
    pub fn validate(&self) -> Result<()> {
        check_signature_width(self.signature_width)
    }

    /// Build and write the artifacts for `source_name`.
    ///
    /// Failures are logged at `error` level before they are returned.
    pub fn run<S: Storage + ?Sized>(
        &self,
        storage: &S,
        source_name: &str,
    ) -> Result<ComputeHashStats> {
        self.build_artifacts(storage, source_name)
            .inspect_err(|e| error!(source = source_name, error = %e, "build failed"))
    }

    fn build_artifacts<S: Storage + ?Sized>(
        &self,
        storage: &S,
        source_name: &str,
    ) -> Result<ComputeHashStats> {
        self.validate()?;

        let parts = storage
            .open_parts(source_name)
            .map_err(|source| HashError::Open {
                name: source_name.to_string(),
                source,
            })?;
        let buffers = BufferSizes::for_mode(self.low_memory);
        let lines = LineCollection::new(source_name, parts, self.encoding)
            .with_buffer_capacity(buffers.input);
        let out_buffer = buffers.output;

        info!(source = source_name, encoding = %self.encoding, "building hash");
        let (hash, report) = OrderedHashBuilder::new()
            .with_seed(self.seed)
            .build(&lines)?;

        let base = storage.destination_base(source_name);
        let mut stats = ComputeHashStats {
            key_count: hash.size64(),
            passes: report.passes,
            levels: report.levels,
            fallback_keys: report.fallback_keys,
            ..Default::default()
        };

        if self.writes_unsigned() {
            let path = PathBuf::from(format!("{}{}", base, MAP_SUFFIX));
            write_artifact(storage, &path, out_buffer, |w| hash.save(w))?;
            stats.unsigned_bits = Some(hash.num_bits());
            stats.outputs.push(path);
        }

        if self.signs() {
            let width = self.signature_width as u32;
            let signed = SignedHash::build(lines.cursor()?, hash, width)?;
            stats.passes += 1;
            debug!(source = source_name, width, bits = signed.num_bits(), "keys signed");

            let path = PathBuf::from(format!("{}{}", base, SIGNED_MAP_SUFFIX));
            write_artifact(storage, &path, out_buffer, |w| signed.save(w))?;
            stats.signed_width = Some(width);
            stats.outputs.push(path);
        }

        if self.write_info {
            let record = stats.info_record();
            let path = PathBuf::from(format!("{}{}", base, INFO_SUFFIX));
            write_artifact(storage, &path, out_buffer, |w| record.write_to(w))?;
            stats.outputs.push(path);
        }

        info!(source = source_name, %stats, "hash built");
        Ok(stats)
    }
}

/// Statistics from one source build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputeHashStats {
    /// Number of keys (lines) in the source
    pub key_count: u64,
    /// Size of the unsigned map, if it was written
    pub unsigned_bits: Option<u64>,
    /// Signature width, if the signed map was written
    pub signed_width: Option<u32>,
    /// Full passes over the source
    pub passes: u32,
    /// Hash levels
    pub levels: u32,
    /// Keys that needed the fallback table
    pub fallback_keys: u64,
    /// Artifacts written, in order
    pub outputs: Vec<PathBuf>,
}

impl ComputeHashStats {
    /// The record written to `.mapinfo`.
    pub fn info_record(&self) -> InfoRecord {
        InfoRecord {
            size: self.key_count,
            unsigned_bits: self.unsigned_bits,
            signed_width: self.signed_width,
        }
    }
}

impl std::fmt::Display for ComputeHashStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Keys: {}, Passes: {}, Levels: {}, Fallback: {}, Outputs: {}",
            self.key_count,
            self.passes,
            self.levels,
            self.fallback_keys,
            self.outputs.len()
        )
    }
}

/// Build the artifacts for `source_name` and return its key count.
///
/// `signature_width <= 0` builds an unsigned map only; otherwise a signed
/// map is written, plus the unsigned one if `keep_unsigned` is set.
pub fn build_hash<S: Storage + ?Sized>(
    storage: &S,
    source_name: &str,
    signature_width: i32,
    keep_unsigned: bool,
    encoding: Encoding,
    write_info: bool,
) -> Result<u64> {
    ComputeHashCommand::new()
        .with_signature_width(signature_width)
        .with_keep_unsigned(keep_unsigned)
        .with_encoding(encoding)
        .with_write_info(write_info)
        .run(storage, source_name)
        .map(|stats| stats.key_count)
}
