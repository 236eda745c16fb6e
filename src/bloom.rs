//! Bloom filter for session-scoped dedup of match and participant ids.
//!
//! Sized from an expected item count and a target false-positive rate; set
//! membership may report false positives (an uncrawled match is skipped,
//! acceptable) but never false negatives (a match is never crawled twice
//! within a session). Cleared wholesale on fresh restart and every few
//! reduces to bound false-positive growth.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DEFAULT_EXPECTED_ITEMS: usize = 1_000_000;
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

const LN2: f64 = std::f64::consts::LN_2;

#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    inserted: u64,
}

impl BloomFilter {
    /// `expected_items` at the target `false_positive_rate` determine the
    /// bit array and hash count. Degenerate inputs are clamped rather than
    /// rejected.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);

        let num_bits = ((-n * p.ln()) / (LN2 * LN2)).ceil().max(64.0) as u64;
        let num_hashes = (((num_bits as f64 / n) * LN2).round() as u32).clamp(1, 16);

        Self {
            bits: vec![0u64; num_bits.div_ceil(64) as usize],
            num_bits,
            num_hashes,
            inserted: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_EXPECTED_ITEMS, DEFAULT_FALSE_POSITIVE_RATE)
    }

    fn hash_pair(item: &str) -> (u64, u64) {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        let h = hasher.finish();
        // Kirsch-Mitzenmacher double hashing from one 64-bit pass; the
        // second hash must be odd so every probe stride hits all bits.
        (h, (h >> 33) | 1)
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> (usize, u64) {
        let idx = h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits;
        ((idx / 64) as usize, 1u64 << (idx % 64))
    }

    pub fn insert(&mut self, item: &str) {
        let (h1, h2) = Self::hash_pair(item);
        for i in 0..self.num_hashes {
            let (word, mask) = self.bit_index(h1, h2, i);
            self.bits[word] |= mask;
        }
        self.inserted += 1;
    }

    pub fn contains(&self, item: &str) -> bool {
        let (h1, h2) = Self::hash_pair(item);
        (0..self.num_hashes).all(|i| {
            let (word, mask) = self.bit_index(h1, h2, i);
            self.bits[word] & mask != 0
        })
    }

    /// Inserts and reports whether the item was (probably) present already.
    pub fn check_and_insert(&mut self, item: &str) -> bool {
        let seen = self.contains(item);
        if !seen {
            self.insert(item);
        }
        seen
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
        self.inserted = 0;
    }

    /// Insertions since the last clear, not deduplicated.
    pub fn approximate_len(&self) -> u64 {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }
}
