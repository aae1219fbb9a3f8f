// Clippy allows for the whole crate
#![allow(clippy::should_implement_trait)]

//! linehash: order-preserving minimal perfect hashing over line sources
//!
//! Builds a compact hash that maps each line of a large text source to its
//! position in the source, plus an optional signed variant that rejects
//! strings outside the original set with probability `1 - 2^-W`.
//!
//! # Features
//!
//! - **Streaming construction**: the source is re-read in a few sequential
//!   passes instead of being loaded into memory
//! - **Multi-part sources**: directories of `part-*` files, zstd-compressed
//!   parts, read as one concatenated stream
//! - **Encodings**: UTF-8 by default, or any WHATWG label such as UTF-16LE
//!   or windows-1252
//! - **Compact artifacts**: `.map`, `.smap` and `.mapinfo` files next to the
//!   source
//!
//! # Example
//!
//! ```rust,no_run
//! use linehash::{build_hash, config::Encoding, mph::Artifact, parts::LocalStorage};
//!
//! let keys = build_hash(&LocalStorage::new(), "keys.txt", 32, true, Encoding::utf8(), true)?;
//! let map = Artifact::open("keys.txt.smap")?;
//! assert!(map.get("some key").map_or(true, |i| i < keys));
//! # Ok::<(), linehash::HashError>(())
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod mph;
pub mod output;
pub mod parts;
pub mod streaming;

// Re-export commonly used types
pub use commands::{build_hash, ComputeHashCommand, ComputeHashStats, LookupCommand};
pub use error::{HashError, Result};
pub use mph::{Artifact, OrderedHash, SignedHash};
pub use parts::{LocalStorage, Storage};
pub use streaming::{LineCollection, LineCursor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::commands::{build_hash, ComputeHashCommand, LookupCommand};
    pub use crate::config::Encoding;
    pub use crate::error::{HashError, Result};
    pub use crate::mph::{Artifact, OrderedHash, Persist, SignedHash};
    pub use crate::parts::{LocalStorage, Storage};
    pub use crate::streaming::{LineCollection, LineCursor, StreamFactory};
}
