//! Key ordering for table construction and lookup.
//!
//! Every table is built and read with the same comparator. Besides raw
//! ordering, the comparator provides the two key-shortening hooks used
//! when emitting index entries: a shortest separator between two blocks
//! and a short successor for the final block.

use std::cmp::Ordering;

/// Total order over keys, plus index-key shortening.
pub trait Comparator: Send + Sync {
    /// The name of the comparator. Tables built with one comparator
    /// must not be read with another.
    fn name(&self) -> &'static str;

    /// Three-way comparison between two keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Returns a key `k` with `start <= k < limit`, as short as the
    /// implementation can manage. Returning `start` unchanged is always
    /// correct.
    fn find_shortest_separator(&self, start: &[u8], limit: &[u8]) -> Vec<u8>;

    /// Returns a key `k >= key`, as short as the implementation can
    /// manage. Returning `key` unchanged is always correct.
    fn find_short_successor(&self, key: &[u8]) -> Vec<u8>;
}

/// Lexicographic byte-wise ordering. The default comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "blocktable.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, start: &[u8], limit: &[u8]) -> Vec<u8> {
        // Length of the common prefix.
        let min_len = start.len().min(limit.len());
        let mut diff = 0;
        while diff < min_len && start[diff] == limit[diff] {
            diff += 1;
        }

        if diff >= min_len {
            // One key is a prefix of the other; no shortening possible.
            return start.to_vec();
        }

        let byte = start[diff];
        if byte < 0xff && byte + 1 < limit[diff] {
            let mut sep = start[..diff + 1].to_vec();
            sep[diff] = byte + 1;
            debug_assert!(sep.as_slice() < limit);
            return sep;
        }

        start.to_vec()
    }

    fn find_short_successor(&self, key: &[u8]) -> Vec<u8> {
        // Truncate after the first byte that can be incremented.
        for (i, &byte) in key.iter().enumerate() {
            if byte != 0xff {
                let mut succ = key[..i + 1].to_vec();
                succ[i] = byte + 1;
                return succ;
            }
        }
        // All 0xff: the key is its own successor.
        key.to_vec()
    }
}
