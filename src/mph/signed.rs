//! Signed wrapper rejecting strings outside the original key set.

use crate::config::MAX_SIGNATURE_WIDTH;
use crate::error::{HashError, Result};
use crate::mph::bits::PackedInts;
use crate::mph::fingerprint::{KeyHasher, SIGNATURE_SEED_OFFSET};
use crate::mph::unsigned::OrderedHash;
use crate::streaming::LineCursor;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// [`OrderedHash`] plus a `width`-bit signature per key.
///
/// A string outside the key set passes the signature check with
/// probability at most `2^-width`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHash {
    hash: OrderedHash,
    width: u32,
    signatures: PackedInts,
}

impl SignedHash {
    /// Sign every key produced by `keys` against `hash`.
    ///
    /// `keys` must be a fresh cursor over the same lines `hash` was built
    /// from.
    pub fn build<R: Read>(mut keys: LineCursor<R>, hash: OrderedHash, width: u32) -> Result<Self> {
        if width == 0 || width > MAX_SIGNATURE_WIDTH {
            return Err(HashError::Config(format!(
                "Signature width must be between 1 and {}, got {}",
                MAX_SIGNATURE_WIDTH, width
            )));
        }

        let n = hash.size64();
        let hasher = signature_hasher(&hash);
        let mut signatures = PackedInts::new(width, n);
        let name = keys.name().to_string();
        let mut count = 0u64;
        while let Some(key) = keys.try_next()? {
            count += 1;
            match hash.get(key) {
                Some(index) if index < n => signatures.set(index, hasher.fingerprint(key)),
                _ => {
                    return Err(HashError::SourceChanged {
                        name,
                        expected: n,
                        actual: count,
                    })
                }
            }
        }
        keys.close();
        if count != n {
            return Err(HashError::SourceChanged {
                name,
                expected: n,
                actual: count,
            });
        }

        Ok(Self {
            hash,
            width,
            signatures,
        })
    }

    /// Input position of `key`, or `None` if its signature does not match.
    pub fn get(&self, key: &str) -> Option<u64> {
        let index = self.hash.get(key)?;
        if index >= self.hash.size64() {
            return None;
        }
        let expected = self.signatures.get(index);
        let actual = signature_hasher(&self.hash).fingerprint(key) & mask(self.width);
        (expected == actual).then_some(index)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn size64(&self) -> u64 {
        self.hash.size64()
    }

    pub fn unsigned(&self) -> &OrderedHash {
        &self.hash
    }

    pub fn num_bits(&self) -> u64 {
        self.hash.num_bits() + self.signatures.num_bits()
    }

    /// Check a decoded map the way [`OrderedHash::validate`] does, plus the
    /// signature table.
    pub fn validate(&self) -> Result<()> {
        self.hash.validate()?;
        if self.width == 0 || self.width > MAX_SIGNATURE_WIDTH {
            return Err(HashError::Format(format!(
                "Signature width {} is outside 1..={}",
                self.width, MAX_SIGNATURE_WIDTH
            )));
        }
        self.signatures.check().map_err(HashError::Format)?;
        if self.signatures.len() != self.hash.size64() || self.signatures.width() != self.width {
            return Err(HashError::Format(format!(
                "Signature table holds {} entries of {} bits for {} keys of {} bits",
                self.signatures.len(),
                self.signatures.width(),
                self.hash.size64(),
                self.width
            )));
        }
        Ok(())
    }
}

fn signature_hasher(hash: &OrderedHash) -> KeyHasher {
    KeyHasher::new(hash.seed() ^ SIGNATURE_SEED_OFFSET)
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
