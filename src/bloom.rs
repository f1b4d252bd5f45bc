//! Probabilistic membership filter.
//!
//! Bundled as a standalone utility; the consensus path does not use it.

use std::collections::hash_map::DefaultHasher;
use std::f64::consts::LN_2;
use std::hash::{Hash, Hasher};

/// A Bloom filter sized from the expected item count and the desired
/// false-positive probability. Lookups may report false positives but
/// never false negatives.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    /// Total bits in the filter.
    size: u64,
    hash_count: u32,
}

impl BloomFilter {
    /// `item_amount`: expected number of inserted elements.
    /// `fp_prob`: target false-positive probability, in (0, 1).
    pub fn new(item_amount: usize, fp_prob: f64) -> Self {
        assert!(item_amount > 0, "item_amount must be positive");
        assert!(
            fp_prob > 0.0 && fp_prob < 1.0,
            "fp_prob must be in (0, 1)"
        );

        let n = item_amount as f64;
        let size = (-(n * fp_prob.ln()) / (LN_2 * LN_2)).ceil().max(1.0) as u64;
        let hash_count = ((size as f64 / n) * LN_2).round().max(1.0) as u32;

        Self {
            words: vec![0; size.div_ceil(64) as usize],
            size,
            hash_count,
        }
    }

    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        for i in 0..self.hash_count {
            let bit = self.bit_index(item, i);
            self.words[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    pub fn contains<T: Hash + ?Sized>(&self, item: &T) -> bool {
        (0..self.hash_count).all(|i| {
            let bit = self.bit_index(item, i);
            self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    pub fn bit_size(&self) -> u64 {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    // Double hashing: g_i(x) = h1(x) + i * h2(x), mod filter size.
    fn bit_index<T: Hash + ?Sized>(&self, item: &T, i: u32) -> u64 {
        let mut h1 = DefaultHasher::new();
        item.hash(&mut h1);
        let a = h1.finish();

        let mut h2 = DefaultHasher::new();
        0x9e37_79b9u32.hash(&mut h2);
        item.hash(&mut h2);
        let b = h2.finish() | 1;

        a.wrapping_add((i as u64).wrapping_mul(b)) % self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_items_are_found() {
        let mut filter = BloomFilter::new(100, 0.01);
        for name in ["alpha", "beta", "gamma"] {
            filter.insert(name);
        }
        assert!(filter.contains("alpha"));
        assert!(filter.contains("beta"));
        assert!(filter.contains("gamma"));
    }

    #[test]
    fn no_false_negatives_over_many_items() {
        let mut filter = BloomFilter::new(1000, 0.01);
        for i in 0..1000u32 {
            filter.insert(&i);
        }
        for i in 0..1000u32 {
            assert!(filter.contains(&i), "item {i} went missing");
        }
    }

    #[test]
    fn false_positive_rate_is_roughly_bounded() {
        let mut filter = BloomFilter::new(1000, 0.01);
        for i in 0..1000u32 {
            filter.insert(&i);
        }
        let false_positives = (1000..11_000u32).filter(|i| filter.contains(i)).count();
        // Target is 1%; allow generous slack for hash quality.
        assert!(
            false_positives < 500,
            "false positive rate too high: {false_positives}/10000"
        );
    }

    #[test]
    fn sizing_follows_the_standard_formulas() {
        let filter = BloomFilter::new(1000, 0.01);
        // m = -n ln(p) / (ln 2)^2 ≈ 9586 bits, k = m/n ln 2 ≈ 7.
        assert!((9500..9700).contains(&filter.bit_size()));
        assert_eq!(filter.hash_count(), 7);
    }

    #[test]
    #[should_panic(expected = "fp_prob")]
    fn rejects_invalid_probability() {
        let _ = BloomFilter::new(10, 1.5);
    }
}
