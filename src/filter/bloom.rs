//! Bloom filter policy.
//!
//! A space-efficient probabilistic structure for set membership.
//! False positives are possible, false negatives are not. The probe
//! count is derived from `bits_per_key` at build time and stored as the
//! final byte of each filter, so probing needs no external config.

use crate::filter::FilterPolicy;

/// Default bits per key (roughly a 1% false positive rate).
pub const DEFAULT_BITS_PER_KEY: usize = 10;

/// Bloom filter policy with double hashing.
///
/// Filter layout: `[bit array][num_probes: 1 byte]`.
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    num_probes: u32,
}

impl BloomFilterPolicy {
    /// Creates a policy allocating `bits_per_key` filter bits per key.
    pub fn new(bits_per_key: usize) -> Self {
        // Optimal probe count is bits_per_key * ln(2).
        let num_probes = ((bits_per_key as f64) * 0.69).round() as u32;
        Self { bits_per_key, num_probes: num_probes.clamp(1, 30) }
    }

    /// Generate probe bit positions for a key using double hashing:
    /// h_i = h1 + i * h2 (mod num_bits).
    fn probe_positions(key: &[u8], num_probes: u32, num_bits: usize) -> Vec<usize> {
        let hash1 = hash_with_seed(key, 0xbc9f1d34);
        let hash2 = hash_with_seed(key, 0xd0e89c7b);

        let mut positions = Vec::with_capacity(num_probes as usize);
        for i in 0..num_probes {
            let hash = hash1.wrapping_add(i.wrapping_mul(hash2));
            positions.push((hash as usize) % num_bits);
        }
        positions
    }
}

impl Default for BloomFilterPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BITS_PER_KEY)
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "blocktable.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[Vec<u8>], dst: &mut Vec<u8>) {
        // Round up to a byte boundary; small key counts get a floor to
        // keep the false positive rate in check.
        let num_bits = (keys.len() * self.bits_per_key).max(64);
        let num_bytes = (num_bits + 7) / 8;
        let num_bits = num_bytes * 8;

        let start = dst.len();
        dst.resize(start + num_bytes, 0);

        for key in keys {
            for pos in Self::probe_positions(key, self.num_probes, num_bits) {
                dst[start + pos / 8] |= 1 << (pos % 8);
            }
        }

        dst.push(self.num_probes as u8);
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }

        let num_probes = filter[filter.len() - 1] as u32;
        if num_probes > 30 {
            // Reserved for future encodings; treat as a match so new
            // formats never produce false negatives on old readers.
            return true;
        }

        let bits = &filter[..filter.len() - 1];
        let num_bits = bits.len() * 8;

        for pos in Self::probe_positions(key, num_probes, num_bits) {
            if bits[pos / 8] & (1 << (pos % 8)) == 0 {
                return false;
            }
        }
        true
    }
}

/// FNV-1a over the key bytes, perturbed by a seed.
fn hash_with_seed(key: &[u8], seed: u32) -> u32 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut state = FNV_OFFSET_BASIS ^ (seed as u64);
    for &byte in key {
        state ^= byte as u64;
        state = state.wrapping_mul(FNV_PRIME);
    }
    state as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(policy: &BloomFilterPolicy, keys: &[&[u8]]) -> Vec<u8> {
        let owned: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
        let mut dst = Vec::new();
        policy.create_filter(&owned, &mut dst);
        dst
    }

    #[test]
    fn test_empty_filter() {
        let policy = BloomFilterPolicy::default();
        let filter = build(&policy, &[]);

        // An empty key set still yields a valid (all-zero) filter.
        assert!(!policy.key_may_match(b"anything", &filter));
    }

    #[test]
    fn test_small_filter() {
        let policy = BloomFilterPolicy::default();
        let filter = build(&policy, &[b"hello", b"world"]);

        assert!(policy.key_may_match(b"hello", &filter));
        assert!(policy.key_may_match(b"world", &filter));
        assert!(!policy.key_may_match(b"x", &filter));
        assert!(!policy.key_may_match(b"foo", &filter));
    }

    #[test]
    fn test_no_false_negatives() {
        for bits_per_key in [1usize, 4, 10, 16] {
            let policy = BloomFilterPolicy::new(bits_per_key);
            let keys: Vec<Vec<u8>> =
                (0..1000).map(|i| format!("key{}", i).into_bytes()).collect();

            let mut filter = Vec::new();
            policy.create_filter(&keys, &mut filter);

            for key in &keys {
                assert!(
                    policy.key_may_match(key, &filter),
                    "false negative at bits_per_key={} for {:?}",
                    bits_per_key,
                    String::from_utf8_lossy(key)
                );
            }
        }
    }

    #[test]
    fn test_false_positive_rate() {
        let policy = BloomFilterPolicy::new(10);
        let keys: Vec<Vec<u8>> =
            (0..10000).map(|i| format!("key{}", i).into_bytes()).collect();

        let mut filter = Vec::new();
        policy.create_filter(&keys, &mut filter);

        let mut false_positives = 0;
        for i in 10000..20000 {
            let key = format!("key{}", i);
            if policy.key_may_match(key.as_bytes(), &filter) {
                false_positives += 1;
            }
        }

        // 10 bits/key targets ~1%; allow generous margin.
        let rate = false_positives as f64 / 10000.0;
        assert!(rate < 0.03, "false positive rate too high: {:.4}", rate);
    }

    #[test]
    fn test_probe_count_stored_in_filter() {
        let policy = BloomFilterPolicy::new(10);
        let filter = build(&policy, &[b"k"]);
        assert_eq!(*filter.last().unwrap(), 7); // round(10 * 0.69)
    }

    #[test]
    fn test_undersized_filter_rejects() {
        let policy = BloomFilterPolicy::default();
        assert!(!policy.key_may_match(b"key", &[]));
        assert!(!policy.key_may_match(b"key", &[7]));
    }

    #[test]
    fn test_reserved_probe_count_matches_everything() {
        let policy = BloomFilterPolicy::default();
        let filter = vec![0u8, 0, 0, 0, 31];
        assert!(policy.key_may_match(b"key", &filter));
    }
}
