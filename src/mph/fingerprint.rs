//! Seeded key hashing.
//!
//! Each key is hashed once per pass with `foldhash`; everything else
//! (per-level positions, signatures) is derived from that 64-bit
//! fingerprint by cheap integer mixing.

use foldhash::fast::FixedState;
use serde::{Deserialize, Serialize};
use std::hash::BuildHasher;

const LEVEL_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed offset separating signature fingerprints from placement fingerprints.
pub const SIGNATURE_SEED_OFFSET: u64 = 0x5349_474E_4154_5552; // "SIGNATUR"

/// 64-bit finalizer from MurmurHash3.
#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

/// Map a 64-bit hash uniformly onto `0..range` without division.
#[inline]
pub fn reduce(hash: u64, range: u64) -> u64 {
    ((hash as u128 * range as u128) >> 64) as u64
}

/// Deterministic string hasher parameterized by a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHasher {
    seed: u64,
}

impl KeyHasher {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn fingerprint(&self, key: &str) -> u64 {
        mix64(FixedState::with_seed(self.seed).hash_one(key.as_bytes()))
    }
}

/// Name recorded in artifacts for the fingerprint function above.
pub const HASHER_NAME: &str = "foldhash-fast+fmix64";

/// Key whose fingerprint is recorded next to the seed.
const CHECK_KEY: &str = "linehash";

/// Identifies the fingerprint function an artifact was built with.
///
/// Besides the name and seed, the fingerprint of a fixed key is stored, so
/// loading an artifact with a build whose hash output differs (a different
/// `foldhash` release, say) is detected instead of silently returning wrong
/// positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasherConfig {
    pub name: String,
    pub seed: u64,
    pub check: u64,
}

impl HasherConfig {
    /// Configuration of this build's hasher for `seed`.
    pub fn current(seed: u64) -> Self {
        Self {
            name: HASHER_NAME.to_string(),
            seed,
            check: KeyHasher::new(seed).fingerprint(CHECK_KEY),
        }
    }

    /// Hasher for these settings, or why it cannot be reproduced.
    pub fn load(&self) -> Result<KeyHasher, String> {
        if self.name != HASHER_NAME {
            return Err(format!("Unsupported hash type: {}", self.name));
        }
        let hasher = KeyHasher::new(self.seed);
        if hasher.fingerprint(CHECK_KEY) != self.check {
            return Err(format!(
                "Hash function {} produces different fingerprints than the one that built this file",
                self.name
            ));
        }
        Ok(hasher)
    }
}

/// Position of a fingerprint in a level of `size` bits.
#[inline]
pub fn level_position(fingerprint: u64, level: u32, size: u64) -> u64 {
    let salted = fingerprint ^ (level as u64 + 1).wrapping_mul(LEVEL_SALT);
    reduce(mix64(salted), size)
}
