//! Bit-level containers used by the hash structures.

use serde::{Deserialize, Serialize};

const WORD_BITS: u64 = 64;

/// Words per rank sample (512 bits).
const RANK_BLOCK_WORDS: usize = 8;

#[inline]
fn words_for(bits: u64) -> usize {
    bits.div_ceil(WORD_BITS) as usize
}

/// Number of bits needed to store any value in `0..n`, at least 1.
pub fn bits_for(n: u64) -> u32 {
    if n <= 2 {
        1
    } else {
        64 - (n - 1).leading_zeros()
    }
}

/// Fixed-length vector of bits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitVector {
    words: Vec<u64>,
    len: u64,
}

impl BitVector {
    pub fn new(len: u64) -> Self {
        Self {
            words: vec![0; words_for(len)],
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, pos: u64) -> bool {
        debug_assert!(pos < self.len);
        (self.words[(pos / WORD_BITS) as usize] >> (pos % WORD_BITS)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, pos: u64) {
        debug_assert!(pos < self.len);
        self.words[(pos / WORD_BITS) as usize] |= 1 << (pos % WORD_BITS);
    }

    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Clear every bit that is set in `other`.
    pub fn clear_all(&mut self, other: &BitVector) {
        debug_assert_eq!(self.len, other.len);
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= !o;
        }
    }

    /// Storage agrees with `len` and no bit past `len` is set.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.words.len() != words_for(self.len) {
            return Err(format!(
                "{} words cannot hold exactly {} bits",
                self.words.len(),
                self.len
            ));
        }
        let tail = self.len % WORD_BITS;
        if tail > 0 && self.words.last().is_some_and(|w| w >> tail != 0) {
            return Err("bits set past the end of a bit vector".to_string());
        }
        Ok(())
    }

    /// Append `other` at the end of this vector.
    pub fn extend(&mut self, other: &BitVector) {
        if self.len % WORD_BITS == 0 {
            self.words.truncate(words_for(self.len));
            self.words.extend_from_slice(&other.words);
            self.len += other.len;
            return;
        }
        let start = self.len;
        self.len += other.len;
        self.words.resize(words_for(self.len), 0);
        for pos in 0..other.len {
            if other.get(pos) {
                self.set(start + pos);
            }
        }
    }
}

/// A bit vector with constant-time rank over sampled blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedBits {
    bits: BitVector,
    samples: Vec<u64>,
}

impl RankedBits {
    pub fn new(bits: BitVector) -> Self {
        let samples = rank_samples(&bits);
        Self { bits, samples }
    }

    /// The bits are well formed and the rank samples match them.
    pub(crate) fn check(&self) -> Result<(), String> {
        self.bits.check()?;
        if self.samples != rank_samples(&self.bits) {
            return Err("rank samples do not match the bit array".to_string());
        }
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[inline]
    pub fn get(&self, pos: u64) -> bool {
        self.bits.get(pos)
    }

    /// Number of set bits strictly before `pos`.
    #[inline]
    pub fn rank(&self, pos: u64) -> u64 {
        let word = (pos / WORD_BITS) as usize;
        let block = word / RANK_BLOCK_WORDS;
        let mut rank = self.samples[block];
        for w in &self.bits.words[block * RANK_BLOCK_WORDS..word] {
            rank += w.count_ones() as u64;
        }
        let offset = pos % WORD_BITS;
        if offset > 0 {
            let mask = (1u64 << offset) - 1;
            rank += (self.bits.words[word] & mask).count_ones() as u64;
        }
        rank
    }

    pub fn count_ones(&self) -> u64 {
        self.samples.last().copied().unwrap_or(0)
    }

    /// Storage footprint in bits, rank samples included.
    pub fn num_bits(&self) -> u64 {
        self.bits.words.len() as u64 * WORD_BITS + self.samples.len() as u64 * WORD_BITS
    }
}

fn rank_samples(bits: &BitVector) -> Vec<u64> {
    let mut samples = Vec::with_capacity(bits.words.len() / RANK_BLOCK_WORDS + 1);
    let mut total = 0u64;
    for block in bits.words.chunks(RANK_BLOCK_WORDS) {
        samples.push(total);
        total += block.iter().map(|w| w.count_ones() as u64).sum::<u64>();
    }
    samples.push(total);
    samples
}

/// Array of fixed-width unsigned integers packed back to back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedInts {
    words: Vec<u64>,
    width: u32,
    len: u64,
}

impl PackedInts {
    /// `len` zeroed entries of `width` bits each (`width <= 64`).
    pub fn new(width: u32, len: u64) -> Self {
        assert!(width <= 64, "packed width {} exceeds 64 bits", width);
        Self {
            words: vec![0; words_for(len * width as u64)],
            width,
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Width is at most 64 and storage covers exactly `len` entries.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.width > 64 {
            return Err(format!("packed width {} exceeds 64 bits", self.width));
        }
        let expected = self
            .len
            .checked_mul(self.width as u64)
            .map(words_for)
            .ok_or_else(|| format!("{} entries of {} bits overflow", self.len, self.width))?;
        if self.words.len() != expected {
            return Err(format!(
                "{} words cannot hold exactly {} entries of {} bits",
                self.words.len(),
                self.len,
                self.width
            ));
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    fn mask(&self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    #[inline]
    pub fn get(&self, index: u64) -> u64 {
        debug_assert!(index < self.len);
        if self.width == 0 {
            return 0;
        }
        let bit = index * self.width as u64;
        let word = (bit / WORD_BITS) as usize;
        let offset = bit % WORD_BITS;
        let mut value = self.words[word] >> offset;
        if offset + self.width as u64 > WORD_BITS {
            value |= self.words[word + 1] << (WORD_BITS - offset);
        }
        value & self.mask()
    }

    /// Store the low `width` bits of `value` at `index`.
    #[inline]
    pub fn set(&mut self, index: u64, value: u64) {
        debug_assert!(index < self.len);
        if self.width == 0 {
            return;
        }
        let mask = self.mask();
        let value = value & mask;
        let bit = index * self.width as u64;
        let word = (bit / WORD_BITS) as usize;
        let offset = bit % WORD_BITS;
        self.words[word] &= !(mask << offset);
        self.words[word] |= value << offset;
        if offset + self.width as u64 > WORD_BITS {
            let shift = WORD_BITS - offset;
            self.words[word + 1] &= !(mask >> shift);
            self.words[word + 1] |= value >> shift;
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.words.len() as u64 * WORD_BITS
    }
}
