//! I/O buffer capacities.
//!
//! A build reads its source front to back once per pass (counting, every
//! level, the fallback table, positions and signatures), so reads dominate.
//! Artifacts are written once at the end. Each open cursor owns one read
//! buffer; with `--threads N` there are up to N of them at a time.

/// Read buffer per cursor. Large enough that a pass over a local file or
/// a zstd part is a few big sequential reads per megabyte.
pub const DEFAULT_INPUT_BUFFER: usize = 256 * 1024;

pub const LOW_MEMORY_INPUT_BUFFER: usize = 64 * 1024;

/// Write buffer for one artifact.
pub const DEFAULT_OUTPUT_BUFFER: usize = 2 * 1024 * 1024;

pub const LOW_MEMORY_OUTPUT_BUFFER: usize = 256 * 1024;

/// Starting capacity of the per-cursor line buffers. They grow to the
/// longest key seen and keep that size for the rest of the pass.
pub const DEFAULT_LINE_BUFFER: usize = 1024;

/// Buffer capacities used for one source build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub input: usize,
    pub output: usize,
}

impl BufferSizes {
    /// Capacities for the default or the `--low-memory` mode.
    pub const fn for_mode(low_memory: bool) -> Self {
        if low_memory {
            Self {
                input: LOW_MEMORY_INPUT_BUFFER,
                output: LOW_MEMORY_OUTPUT_BUFFER,
            }
        } else {
            Self {
                input: DEFAULT_INPUT_BUFFER,
                output: DEFAULT_OUTPUT_BUFFER,
            }
        }
    }
}
