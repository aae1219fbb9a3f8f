//! Minimal perfect hashing over streamed keys.
//!
//! - [`OrderedHash`]: maps each key of the source to its input position
//! - [`SignedHash`]: adds a per-key signature so foreign strings are rejected
//! - [`Artifact`]: reading either structure back from disk

pub mod artifact;
pub mod bits;
pub mod fingerprint;
pub mod signed;
pub mod unsigned;

pub use artifact::{Artifact, Persist, MAP_MAGIC, SIGNED_MAGIC};
pub use signed::SignedHash;
pub use unsigned::{BuildReport, OrderedHash, OrderedHashBuilder};
