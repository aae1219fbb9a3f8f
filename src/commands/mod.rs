//! Command implementations for linehash.

pub mod compute;
pub mod lookup;

pub use compute::{build_hash, ComputeHashCommand, ComputeHashStats};
pub use lookup::{lookup_keys, LookupCommand, LookupStats};
