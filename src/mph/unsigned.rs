//! Order-preserving minimal perfect hash over the lines of a source.
//!
//! # Algorithm
//!
//! 1. Count the keys (one pass, cached by the collection).
//! 2. Level passes: every key not yet placed is hashed into a bit array of
//!    about twice the number of unplaced keys. Positions hit by exactly one
//!    key are kept; those keys are placed at this level.
//! 3. Keys still unplaced after the last level (or after a level that placed
//!    nothing) are collected in one more pass into a sorted fallback table.
//!    This is where duplicate lines surface, since two equal keys collide at
//!    every level.
//! 4. Position pass: the rank of a key's bit across all levels is its slot;
//!    each slot stores the key's input position in a packed array.
//!
//! Lookup of an in-set key returns its zero-based input position, so the
//! mapping is a bijection onto `0..N` that preserves input order.
//!
//! # Memory Complexity
//!
//! About `2N` bits during construction plus the fallback keys, which are
//! empty in practice for distinct inputs.

use crate::error::{HashError, Result};
use crate::mph::bits::{bits_for, BitVector, PackedInts, RankedBits};
use crate::mph::fingerprint::{level_position, HasherConfig, KeyHasher};
use crate::streaming::{LineCollection, StreamFactory};
use crate::config::DEFAULT_SEED;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on level passes before falling back to the explicit table.
pub const MAX_LEVELS: u32 = 32;

/// Smallest level bit array.
pub const MIN_LEVEL_BITS: u64 = 64;

/// Level size in bits for `remaining` unplaced keys (load factor 1/2).
fn level_size(remaining: u64) -> u64 {
    remaining
        .saturating_mul(2)
        .max(MIN_LEVEL_BITS)
        .next_multiple_of(MIN_LEVEL_BITS)
}

/// Placement of one level inside the concatenated bit array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub offset: u64,
    pub size: u64,
}

/// Immutable order-preserving minimal perfect hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedHash {
    len: u64,
    hasher: HasherConfig,
    levels: Vec<Level>,
    bits: RankedBits,
    fallback: Vec<String>,
    positions: PackedInts,
}

/// What a build cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Full passes over the source, counting pass included.
    pub passes: u32,
    /// Levels kept in the final structure.
    pub levels: u32,
    /// Keys stored in the fallback table.
    pub fallback_keys: u64,
}

/// Configures and runs [`OrderedHash`] construction.
#[derive(Debug, Clone)]
pub struct OrderedHashBuilder {
    seed: u64,
}

impl Default for OrderedHashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedHashBuilder {
    pub fn new() -> Self {
        Self { seed: DEFAULT_SEED }
    }

    /// Override the fingerprint seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the hash with as many passes over `lines` as needed.
    ///
    /// # Errors
    ///
    /// Fails on any read error, with [`HashError::DuplicateKey`] if a line
    /// occurs twice, and with [`HashError::SourceChanged`] if a pass sees a
    /// different number of lines than the first one.
    pub fn build<F: StreamFactory>(
        self,
        lines: &LineCollection<F>,
    ) -> Result<(OrderedHash, BuildReport)> {
        let hasher = KeyHasher::new(self.seed);
        let name = lines.name();
        let mut report = BuildReport::default();

        if lines.cached_size().is_none() {
            report.passes += 1;
        }
        let n = lines.size()?;
        debug!(source = name, keys = n, "counted keys");

        let mut level_bits: Vec<BitVector> = Vec::new();
        let mut remaining = n;
        while remaining > 0 && (level_bits.len() as u32) < MAX_LEVELS {
            let level = level_bits.len() as u32;
            let size = level_size(remaining);
            let mut seen = BitVector::new(size);
            let mut collided = BitVector::new(size);
            let mut hashed = 0u64;
            let mut count = 0u64;

            let mut cursor = lines.cursor()?;
            while let Some(key) = cursor.try_next()? {
                count += 1;
                let fp = hasher.fingerprint(key);
                if placed_in(&level_bits, fp) {
                    continue;
                }
                hashed += 1;
                let pos = level_position(fp, level, size);
                if seen.get(pos) {
                    collided.set(pos);
                } else {
                    seen.set(pos);
                }
            }
            report.passes += 1;
            check_count(name, n, count)?;

            seen.clear_all(&collided);
            let placed = seen.count_ones();
            debug!(
                source = name,
                level,
                bits = size,
                placed,
                remaining = hashed - placed,
                "level constructed"
            );
            if placed == 0 {
                break;
            }
            remaining = hashed - placed;
            level_bits.push(seen);
        }

        let mut fallback = Vec::new();
        if remaining > 0 {
            let mut count = 0u64;
            let mut cursor = lines.cursor()?;
            while let Some(key) = cursor.try_next()? {
                count += 1;
                if !placed_in(&level_bits, hasher.fingerprint(key)) {
                    fallback.push(key.to_string());
                }
            }
            report.passes += 1;
            check_count(name, n, count)?;

            fallback.sort_unstable();
            if let Some(pair) = fallback.windows(2).find(|pair| pair[0] == pair[1]) {
                return Err(HashError::DuplicateKey(pair[0].clone()));
            }
            debug!(source = name, keys = fallback.len(), "fallback table built");
        }

        let mut all = BitVector::new(0);
        let mut levels = Vec::with_capacity(level_bits.len());
        for bits in &level_bits {
            levels.push(Level {
                offset: all.len(),
                size: bits.len(),
            });
            all.extend(bits);
        }
        drop(level_bits);

        let mut hash = OrderedHash {
            len: n,
            hasher: HasherConfig::current(self.seed),
            levels,
            bits: RankedBits::new(all),
            fallback,
            positions: PackedInts::new(bits_for(n), n),
        };
        let slots = hash.bits.count_ones() + hash.fallback.len() as u64;
        if slots != n {
            return Err(HashError::SourceChanged {
                name: name.to_string(),
                expected: n,
                actual: slots,
            });
        }

        let mut index = 0u64;
        let mut cursor = lines.cursor()?;
        while let Some(key) = cursor.try_next()? {
            let slot = match hash.slot(key) {
                Some(slot) if index < n => slot,
                _ => {
                    return Err(HashError::SourceChanged {
                        name: name.to_string(),
                        expected: n,
                        actual: index + 1,
                    })
                }
            };
            hash.positions.set(slot, index);
            index += 1;
        }
        report.passes += 1;
        check_count(name, n, index)?;

        report.levels = hash.levels.len() as u32;
        report.fallback_keys = hash.fallback.len() as u64;
        Ok((hash, report))
    }
}

fn placed_in(levels: &[BitVector], fingerprint: u64) -> bool {
    levels
        .iter()
        .enumerate()
        .any(|(level, bits)| bits.get(level_position(fingerprint, level as u32, bits.len())))
}

fn check_count(name: &str, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(HashError::SourceChanged {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

impl OrderedHash {
    /// Build with the default seed.
    pub fn build<F: StreamFactory>(lines: &LineCollection<F>) -> Result<Self> {
        OrderedHashBuilder::new().build(lines).map(|(hash, _)| hash)
    }

    /// Input position of `key`.
    ///
    /// Always `Some` for keys of the original set. For other strings the
    /// result is either `None` or an arbitrary position; use
    /// [`SignedHash`](crate::mph::SignedHash) to reject them reliably.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.slot(key).map(|slot| self.positions.get(slot))
    }

    fn slot(&self, key: &str) -> Option<u64> {
        let fp = KeyHasher::new(self.hasher.seed).fingerprint(key);
        for (level, placement) in self.levels.iter().enumerate() {
            let pos = placement.offset + level_position(fp, level as u32, placement.size);
            if self.bits.get(pos) {
                return Some(self.bits.rank(pos));
            }
        }
        self.fallback
            .binary_search_by(|entry| entry.as_str().cmp(key))
            .ok()
            .map(|i| self.bits.count_ones() + i as u64)
    }

    /// Number of keys.
    pub fn size64(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn seed(&self) -> u64 {
        self.hasher.seed
    }

    /// Check that a decoded hash is internally consistent and was built
    /// with the fingerprint function of this build.
    ///
    /// Lookups on a hash that passed this check cannot index out of bounds.
    pub fn validate(&self) -> Result<()> {
        self.hasher.load().map_err(HashError::Format)?;
        self.bits.check().map_err(HashError::Format)?;

        let mut offset = 0u64;
        for (level, placement) in self.levels.iter().enumerate() {
            if placement.offset != offset || placement.size == 0 {
                return Err(HashError::Format(format!(
                    "Level {} at offset {} with {} bits does not follow the previous level",
                    level, placement.offset, placement.size
                )));
            }
            offset = offset
                .checked_add(placement.size)
                .ok_or_else(|| HashError::Format("Level sizes overflow".to_string()))?;
        }
        if offset != self.bits.len() {
            return Err(HashError::Format(format!(
                "Levels cover {} bits but the bit array has {}",
                offset,
                self.bits.len()
            )));
        }

        if self.fallback.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(HashError::Format("Fallback table is not sorted".to_string()));
        }
        let slots = self.bits.count_ones() + self.fallback.len() as u64;
        if slots != self.len {
            return Err(HashError::Format(format!(
                "{} slots for {} keys",
                slots, self.len
            )));
        }

        self.positions.check().map_err(HashError::Format)?;
        if self.positions.len() != self.len || self.positions.width() != bits_for(self.len) {
            return Err(HashError::Format(format!(
                "Position table holds {} entries of {} bits for {} keys",
                self.positions.len(),
                self.positions.width(),
                self.len
            )));
        }
        Ok(())
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Approximate in-memory footprint in bits.
    pub fn num_bits(&self) -> u64 {
        let level_meta = self.levels.len() as u64 * 128;
        let fallback: u64 = self
            .fallback
            .iter()
            .map(|k| (k.len() as u64 + 8) * 8)
            .sum();
        self.bits.num_bits() + self.positions.num_bits() + level_meta + fallback + 128
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use std::io::{self, Cursor};

    fn lines_of(content: String) -> LineCollection<impl Fn() -> io::Result<Cursor<Vec<u8>>>> {
        let bytes = content.into_bytes();
        LineCollection::new("test", move || Ok::<_, io::Error>(Cursor::new(bytes.clone())), Encoding::utf8())
    }

    #[test]
    fn test_three_keys() {
        let lines = lines_of("alpha\nbeta\ngamma\n".to_string());
        let (hash, report) = OrderedHashBuilder::new().build(&lines).unwrap();
        assert_eq!(hash.size64(), 3);
        assert_eq!(hash.get("alpha"), Some(0));
        assert_eq!(hash.get("beta"), Some(1));
        assert_eq!(hash.get("gamma"), Some(2));
        assert!(hash.num_bits() > 0);
        assert!(report.passes >= 3);
    }

    #[test]
    fn test_order_preserved_for_many_keys() {
        let keys: Vec<String> = (0..5000).map(|i| format!("key-{:06}", (i * 7919) % 5000)).collect();
        let lines = lines_of(keys.join("\n"));
        let hash = OrderedHash::build(&lines).unwrap();
        assert_eq!(hash.size64(), 5000);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(hash.get(key), Some(i as u64), "key {}", key);
        }
    }

    #[test]
    fn test_empty_source() {
        let lines = lines_of(String::new());
        let (hash, report) = OrderedHashBuilder::new().build(&lines).unwrap();
        assert_eq!(hash.size64(), 0);
        assert!(hash.is_empty());
        assert_eq!(hash.get("anything"), None);
        assert_eq!(report.levels, 0);
    }

    #[test]
    fn test_duplicates_rejected() {
        let lines = lines_of("x\nx\n".to_string());
        match OrderedHash::build(&lines) {
            Err(HashError::DuplicateKey(key)) => assert_eq!(key, "x"),
            other => panic!("expected duplicate key error, got {:?}", other.map(|h| h.size64())),
        }

        let lines = lines_of("a\nb\nc\nb\nd\n".to_string());
        assert!(matches!(
            OrderedHash::build(&lines),
            Err(HashError::DuplicateKey(ref k)) if k == "b"
        ));
    }

    #[test]
    fn test_empty_line_is_a_key() {
        let lines = lines_of("a\n\nb\n".to_string());
        let hash = OrderedHash::build(&lines).unwrap();
        assert_eq!(hash.get(""), Some(1));
    }

    #[test]
    fn test_seed_changes_layout_not_mapping() {
        let keys: Vec<String> = (0..300).map(|i| format!("k{}", i)).collect();
        let lines = lines_of(keys.join("\n"));
        let (a, _) = OrderedHashBuilder::new().with_seed(1).build(&lines).unwrap();
        let (b, _) = OrderedHashBuilder::new().with_seed(2).build(&lines).unwrap();
        assert_ne!(a, b);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(a.get(key), Some(i as u64));
            assert_eq!(b.get(key), Some(i as u64));
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let lines = lines_of("one\ntwo\nthree\nfour\n".to_string());
        assert_eq!(
            OrderedHash::build(&lines).unwrap(),
            OrderedHash::build(&lines).unwrap()
        );
    }

    #[test]
    fn test_source_changing_between_passes() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let opens = AtomicUsize::new(0);
        let factory = move || {
            let n = opens.fetch_add(1, Ordering::SeqCst);
            let content = if n == 0 { "a\nb\n" } else { "a\nb\nc\n" };
            Ok::<_, io::Error>(Cursor::new(content.as_bytes().to_vec()))
        };
        let lines = LineCollection::new("shifty", factory, Encoding::utf8());
        assert!(matches!(
            OrderedHash::build(&lines),
            Err(HashError::SourceChanged { expected: 2, actual: 3, .. })
        ));
    }

    fn built(content: &str) -> OrderedHash {
        OrderedHash::build(&lines_of(content.to_string())).unwrap()
    }

    fn assert_rejected(hash: &OrderedHash) {
        assert!(matches!(hash.validate(), Err(HashError::Format(_))));
    }

    #[test]
    fn test_validate_accepts_built_hashes() {
        assert!(built("").validate().is_ok());
        assert!(built("a\nb\nc\n").validate().is_ok());
        let keys: Vec<String> = (0..3000).map(|i| format!("item/{}", i)).collect();
        assert!(built(&keys.join("\n")).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inconsistent_levels() {
        let hash = built("a\nb\nc\nd\ne\nf\ng\nh\n");
        assert!(!hash.levels.is_empty());

        let mut far = hash.clone();
        far.levels[0].offset = 1 << 40;
        assert_rejected(&far);

        let mut oversized = hash.clone();
        oversized.levels[0].size += 64;
        assert_rejected(&oversized);

        let mut empty_level = hash.clone();
        empty_level.levels.push(Level {
            offset: hash.bits.len(),
            size: 0,
        });
        assert_rejected(&empty_level);

        let mut missing = hash;
        missing.levels.clear();
        assert_rejected(&missing);
    }

    #[test]
    fn test_validate_rejects_inconsistent_tables() {
        let hash = built("a\nb\nc\nd\n");

        let mut longer = hash.clone();
        longer.len += 1;
        assert_rejected(&longer);

        let mut positions = hash.clone();
        positions.positions = PackedInts::new(bits_for(hash.len), hash.len - 1);
        assert_rejected(&positions);

        let mut extra = hash.clone();
        extra.fallback.push("zzz".to_string());
        assert_rejected(&extra);

        let mut unsorted = hash.clone();
        unsorted.bits = RankedBits::new(BitVector::new(hash.bits.len()));
        unsorted.fallback = vec!["d", "c", "b", "a"].into_iter().map(String::from).collect();
        assert_rejected(&unsorted);

        let mut foreign = hash;
        foreign.hasher.name = "crc32".to_string();
        assert_rejected(&foreign);
    }

    #[test]
    fn test_corrupt_artifact_fails_to_load_instead_of_panicking() {
        use crate::mph::{Artifact, Persist};

        let mut hash = built("a\nb\nc\nd\ne\nf\ng\nh\n");
        hash.levels[0].offset = 1 << 40;
        let mut buf = Vec::new();
        hash.save(&mut buf).unwrap();

        assert!(matches!(Artifact::from_slice(&buf), Err(HashError::Format(_))));
        assert!(matches!(OrderedHash::load(&buf[..]), Err(HashError::Format(_))));
    }
}
