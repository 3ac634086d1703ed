//! Block format: the atomic unit of table storage.
//!
//! A block holds sorted key-value records with prefix compression,
//! punctuated by restart points where the full key is stored so
//! iterators can binary-search without decoding the whole block.
//!
//! Format:
//! ```text
//! [Entry 1]
//! ...
//! [Entry N]
//! [Restart Point 1: u32]
//! ...
//! [Restart Point M: u32]
//! [Num Restarts: u32]
//! ```
//!
//! Each entry format:
//! ```text
//! [shared_key_len: varint]    // Length of prefix shared with previous key
//! [unshared_key_len: varint]  // Length of unshared key suffix
//! [value_len: varint]         // Length of value
//! [unshared_key: bytes]       // Key suffix
//! [value: bytes]              // Value data
//! ```

use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::util::coding::{decode_varint32, get_fixed32, put_varint32};
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::sync::Arc;

/// An immutable, decoded block buffer.
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Create a Block from raw (already decompressed) data.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("block too small for restart count"));
        }

        let num_restarts = get_fixed32(&data, data.len() - 4).unwrap();
        if num_restarts == 0 {
            // The builder always emits at least one restart, even for
            // an empty block.
            return Err(Error::corruption("block has no restart points"));
        }
        let restart_bytes = (num_restarts as usize)
            .checked_mul(4)
            .and_then(|n| n.checked_add(4))
            .ok_or_else(|| Error::corruption("restart count overflow"))?;

        if restart_bytes > data.len() {
            return Err(Error::corruption(
                "restart count inconsistent with block size",
            ));
        }

        let restart_offset = data.len() - restart_bytes;
        Ok(Self { data, restart_offset, num_restarts })
    }

    /// Number of restart points in the block.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Size of the underlying buffer in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn restart_point(&self, index: u32) -> u32 {
        debug_assert!(index < self.num_restarts);
        get_fixed32(&self.data, self.restart_offset + index as usize * 4).unwrap()
    }

    /// Decodes the full key stored at a restart point. Restart entries
    /// never share a prefix, so the key is read directly.
    fn restart_key(&self, index: u32) -> Result<&[u8]> {
        let offset = self.restart_point(index) as usize;
        let entry = self
            .data
            .get(offset..self.restart_offset)
            .ok_or_else(|| Error::corruption("restart point out of range"))?;

        let (shared, n1) =
            decode_varint32(entry).ok_or_else(|| Error::corruption("bad entry header"))?;
        let (unshared, n2) = decode_varint32(&entry[n1..])
            .ok_or_else(|| Error::corruption("bad entry header"))?;
        let (_value_len, n3) = decode_varint32(&entry[n1 + n2..])
            .ok_or_else(|| Error::corruption("bad entry header"))?;

        if shared != 0 {
            return Err(Error::corruption("restart entry shares a key prefix"));
        }

        let start = n1 + n2 + n3;
        entry
            .get(start..start + unshared as usize)
            .ok_or_else(|| Error::corruption("restart key out of range"))
    }

    /// Create an iterator over the block using the given key order.
    pub fn iter(&self, comparator: Arc<dyn Comparator>) -> BlockIterator {
        BlockIterator::new(self.clone(), comparator)
    }

    /// Get the raw data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// BlockBuilder serializes sorted key-value pairs with prefix
/// compression. Reusable across blocks via [`reset`](Self::reset).
pub struct BlockBuilder {
    buffer: BytesMut,
    restarts: Vec<u32>,
    counter: usize,
    last_key: Vec<u8>,
    block_restart_interval: usize,
    comparator: Arc<dyn Comparator>,
    finished: bool,
}

impl BlockBuilder {
    /// Create a new BlockBuilder.
    pub fn new(block_restart_interval: usize, comparator: Arc<dyn Comparator>) -> Self {
        assert!(block_restart_interval >= 1);
        Self {
            buffer: BytesMut::new(),
            restarts: vec![0],
            counter: 0,
            last_key: Vec::new(),
            block_restart_interval,
            comparator,
            finished: false,
        }
    }

    /// Add a key-value pair. Keys must arrive in strictly increasing
    /// comparator order; violating this is a caller contract error.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add after finish without reset");
        assert!(
            self.is_empty() || self.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys must be added in strictly increasing order"
        );

        let mut shared = 0;
        if self.counter >= self.block_restart_interval {
            // Start a new restart: store the full key.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        } else {
            shared = shared_prefix_len(&self.last_key, key);
        }

        let unshared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, unshared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Append the restart trailer and return the finished block bytes.
    /// The result stays valid until [`reset`](Self::reset).
    pub fn finish(&mut self) -> &[u8] {
        if !self.finished {
            for &restart in &self.restarts {
                self.buffer.put_u32_le(restart);
            }
            self.buffer.put_u32_le(self.restarts.len() as u32);
            self.finished = true;
        }
        &self.buffer
    }

    /// Clear all state so the builder can produce another block.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.finished = false;
    }

    /// Running estimate of the finished block size. Cheap; used by the
    /// flush policy on every add.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// True if no entries have been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    let min_len = a.len().min(b.len());
    let mut i = 0;
    while i < min_len && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Cursor over a decoded block.
///
/// Freshly constructed iterators are not positioned; call one of the
/// seek methods first. A corrupt entry puts the iterator into a
/// permanent error state observable through [`status`](Self::status).
pub struct BlockIterator {
    block: Block,
    comparator: Arc<dyn Comparator>,
    /// Offset of the current entry, only meaningful while valid.
    current: usize,
    /// Offset where the next entry begins.
    next_offset: usize,
    restart_index: u32,
    key: Vec<u8>,
    value: Vec<u8>,
    valid: bool,
    corruption: Option<String>,
}

impl BlockIterator {
    fn new(block: Block, comparator: Arc<dyn Comparator>) -> Self {
        Self {
            block,
            comparator,
            current: 0,
            next_offset: 0,
            restart_index: 0,
            key: Vec::new(),
            value: Vec::new(),
            valid: false,
            corruption: None,
        }
    }

    /// Check if the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Non-OK once a malformed entry has been encountered.
    pub fn status(&self) -> Result<()> {
        match &self.corruption {
            Some(msg) => Err(Error::corruption(msg.clone())),
            None => Ok(()),
        }
    }

    /// Get the current key.
    pub fn key(&self) -> &[u8] {
        assert!(self.valid, "iterator not valid");
        &self.key
    }

    /// Get the current value.
    pub fn value(&self) -> &[u8] {
        assert!(self.valid, "iterator not valid");
        &self.value
    }

    /// Position at the first entry.
    pub fn seek_to_first(&mut self) {
        if self.corrupted() {
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_entry();
    }

    /// Position at the last entry. Costs a scan from the final restart.
    pub fn seek_to_last(&mut self) {
        if self.corrupted() {
            return;
        }
        if self.block.restart_offset == 0 {
            self.valid = false;
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_entry() && self.next_offset < self.block.restart_offset {}
    }

    /// Position at the first entry with key >= target, or become
    /// invalid if no such entry exists.
    pub fn seek(&mut self, target: &[u8]) {
        if self.corrupted() {
            return;
        }

        // Binary search the restart array for the last restart whose
        // full key is < target.
        let mut left = 0u32;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let restart_key = match self.block.restart_key(mid) {
                Ok(k) => k,
                Err(e) => {
                    self.set_corrupt(&e);
                    return;
                }
            };
            if self.comparator.compare(restart_key, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        // Linear scan forward decoding prefix deltas.
        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    /// Advance to the next entry.
    pub fn next(&mut self) {
        assert!(self.valid, "iterator not valid");
        self.parse_next_entry();
    }

    /// Step back to the previous entry, or become invalid at the start.
    /// Implemented by rewinding to the nearest restart before the
    /// current entry and scanning forward; restart spacing bounds the
    /// cost.
    pub fn prev(&mut self) {
        assert!(self.valid, "iterator not valid");
        let original = self.current;

        while self.block.restart_point(self.restart_index) as usize >= original {
            if self.restart_index == 0 {
                self.valid = false;
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.next_offset >= original {
                return;
            }
        }
    }

    fn corrupted(&mut self) -> bool {
        if self.corruption.is_some() {
            self.valid = false;
            return true;
        }
        false
    }

    fn set_corrupt(&mut self, err: &Error) {
        self.corruption = Some(err.to_string());
        self.valid = false;
        self.key.clear();
        self.value.clear();
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        let offset = self.block.restart_point(index) as usize;
        self.current = offset;
        self.next_offset = offset;
        self.valid = false;
    }

    /// Decode the entry at `next_offset`, reconstructing the key from
    /// the running prefix. Returns false at end of block or on
    /// corruption.
    fn parse_next_entry(&mut self) -> bool {
        if self.next_offset >= self.block.restart_offset {
            self.valid = false;
            return false;
        }

        let entry = &self.block.data[self.next_offset..self.block.restart_offset];
        let header = (|| {
            let (shared, n1) = decode_varint32(entry)?;
            let (unshared, n2) = decode_varint32(&entry[n1..])?;
            let (value_len, n3) = decode_varint32(&entry[n1 + n2..])?;
            Some((shared as usize, unshared as usize, value_len as usize, n1 + n2 + n3))
        })();

        let (shared, unshared, value_len, header_len) = match header {
            Some(h) => h,
            None => {
                self.set_corrupt(&Error::corruption("bad entry header"));
                return false;
            }
        };

        if shared > self.key.len() || header_len + unshared + value_len > entry.len() {
            self.set_corrupt(&Error::corruption("entry extends past block end"));
            return false;
        }

        let key_suffix = &entry[header_len..header_len + unshared];
        let value = &entry[header_len + unshared..header_len + unshared + value_len];

        self.key.truncate(shared);
        self.key.extend_from_slice(key_suffix);
        self.value.clear();
        self.value.extend_from_slice(value);

        self.current = self.next_offset;
        self.next_offset += header_len + unshared + value_len;

        // Track which restart region the cursor is in for prev().
        while self.restart_index + 1 < self.block.num_restarts
            && (self.block.restart_point(self.restart_index + 1) as usize) <= self.current
        {
            self.restart_index += 1;
        }

        self.valid = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    fn cmp() -> Arc<dyn Comparator> {
        Arc::new(BytewiseComparator)
    }

    fn build_block(interval: usize, entries: &[(&[u8], &[u8])]) -> Block {
        let mut builder = BlockBuilder::new(interval, cmp());
        for (key, value) in entries {
            builder.add(key, value);
        }
        Block::new(Bytes::copy_from_slice(builder.finish())).unwrap()
    }

    #[test]
    fn test_block_builder_empty() {
        let mut builder = BlockBuilder::new(16, cmp());
        assert!(builder.is_empty());

        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();
        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert!(!iter.valid());
    }

    #[test]
    fn test_block_single_entry() {
        let block = build_block(16, &[(b"key1", b"value1")]);
        assert_eq!(block.num_restarts(), 1);

        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key1");
        assert_eq!(iter.value(), b"value1");

        iter.next();
        assert!(!iter.valid());
    }

    #[test]
    fn test_block_restart_spacing() {
        let block = build_block(
            2,
            &[(b"key1", b"v1"), (b"key2", b"v2"), (b"key3", b"v3")],
        );
        // Restart at entry 0 and entry 2.
        assert_eq!(block.num_restarts(), 2);
    }

    #[test]
    fn test_sequential_scan() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
            .map(|i| (format!("key{:04}", i).into_bytes(), format!("val{}", i).into_bytes()))
            .collect();

        let mut builder = BlockBuilder::new(4, cmp());
        for (k, v) in &entries {
            builder.add(k, v);
        }
        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();

        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        for (k, v) in &entries {
            assert!(iter.valid());
            assert_eq!(iter.key(), k.as_slice());
            assert_eq!(iter.value(), v.as_slice());
            iter.next();
        }
        assert!(!iter.valid());
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_seek() {
        let block = build_block(
            3,
            &[
                (b"apple", b"1"),
                (b"banana", b"2"),
                (b"cherry", b"3"),
                (b"grape", b"4"),
                (b"melon", b"5"),
            ],
        );
        let mut iter = block.iter(cmp());

        // Exact hit.
        iter.seek(b"cherry");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"cherry");

        // Absent key lands on the next larger key.
        iter.seek(b"coconut");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"grape");

        // Before the first key.
        iter.seek(b"aaa");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"apple");

        // Past the last key.
        iter.seek(b"zzz");
        assert!(!iter.valid());
    }

    #[test]
    fn test_seek_every_position() {
        let entries: Vec<Vec<u8>> =
            (0..50).map(|i| format!("key{:04}", i * 2).into_bytes()).collect();

        let mut builder = BlockBuilder::new(5, cmp());
        for k in &entries {
            builder.add(k, b"v");
        }
        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();
        let mut iter = block.iter(cmp());

        for i in 0..50 {
            // Present key.
            let key = format!("key{:04}", i * 2);
            iter.seek(key.as_bytes());
            assert!(iter.valid());
            assert_eq!(iter.key(), key.as_bytes());

            // Key between entries: lands on the next one.
            let between = format!("key{:04}", i * 2 + 1);
            iter.seek(between.as_bytes());
            if i == 49 {
                assert!(!iter.valid());
            } else {
                assert!(iter.valid());
                assert_eq!(iter.key(), format!("key{:04}", (i + 1) * 2).as_bytes());
            }
        }
    }

    #[test]
    fn test_prev() {
        let block = build_block(
            2,
            &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3"), (b"d", b"4")],
        );
        let mut iter = block.iter(cmp());

        iter.seek(b"d");
        assert_eq!(iter.key(), b"d");

        iter.prev();
        assert!(iter.valid());
        assert_eq!(iter.key(), b"c");

        iter.prev();
        assert_eq!(iter.key(), b"b");

        iter.prev();
        assert_eq!(iter.key(), b"a");

        // Stepping before the first entry invalidates.
        iter.prev();
        assert!(!iter.valid());
    }

    #[test]
    fn test_seek_to_last_then_walk_back() {
        let entries: Vec<Vec<u8>> =
            (0..30).map(|i| format!("k{:03}", i).into_bytes()).collect();
        let mut builder = BlockBuilder::new(7, cmp());
        for k in &entries {
            builder.add(k, b"v");
        }
        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();

        let mut iter = block.iter(cmp());
        iter.seek_to_last();
        for i in (0..30).rev() {
            assert!(iter.valid());
            assert_eq!(iter.key(), format!("k{:03}", i).as_bytes());
            iter.prev();
        }
        assert!(!iter.valid());
    }

    #[test]
    fn test_restart_interval_one_disables_prefix_sharing() {
        let mut builder = BlockBuilder::new(1, cmp());
        builder.add(b"prefix_a", b"1");
        builder.add(b"prefix_b", b"2");
        builder.add(b"prefix_c", b"3");
        let data = Bytes::copy_from_slice(builder.finish());
        let block = Block::new(data).unwrap();

        // One restart per entry, every key stored in full.
        assert_eq!(block.num_restarts(), 3);
        assert_eq!(block.restart_key(0).unwrap(), b"prefix_a");
        assert_eq!(block.restart_key(1).unwrap(), b"prefix_b");
        assert_eq!(block.restart_key(2).unwrap(), b"prefix_c");
    }

    #[test]
    fn test_builder_reset_reuse() {
        let mut builder = BlockBuilder::new(16, cmp());
        builder.add(b"x", b"1");
        builder.finish();

        builder.reset();
        assert!(builder.is_empty());
        builder.add(b"a", b"2");
        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();

        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert_eq!(iter.key(), b"a");
    }

    #[test]
    fn test_size_estimate_tracks_growth() {
        let mut builder = BlockBuilder::new(16, cmp());
        let empty = builder.current_size_estimate();
        builder.add(b"key", b"value");
        assert!(builder.current_size_estimate() > empty);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_unsorted_keys_panic() {
        let mut builder = BlockBuilder::new(16, cmp());
        builder.add(b"key2", b"v");
        builder.add(b"key1", b"v");
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_duplicate_keys_panic() {
        let mut builder = BlockBuilder::new(16, cmp());
        builder.add(b"key", b"v");
        builder.add(b"key", b"v");
    }

    #[test]
    fn test_block_too_small_is_corruption() {
        let result = Block::new(Bytes::from_static(&[0u8, 1, 2]));
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_zero_restart_count_is_corruption() {
        // Well-formed trailer claiming zero restarts; only corrupt data
        // can look like this.
        let data = 0u32.to_le_bytes().to_vec();
        let result = Block::new(Bytes::from(data));
        assert!(matches!(result, Err(Error::Corruption(_))));

        let mut data = vec![0u8; 8];
        data.extend_from_slice(&0u32.to_le_bytes());
        let result = Block::new(Bytes::from(data));
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_restart_count_inconsistent_is_corruption() {
        // Claims 100 restarts in an 8-byte buffer.
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&100u32.to_le_bytes());
        let result = Block::new(Bytes::from(data));
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_corrupt_entry_sets_error_state() {
        // Valid trailer (one restart at 0) over garbage entry bytes.
        let mut data = vec![0xffu8; 8];
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        let block = Block::new(Bytes::from(data)).unwrap();

        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().is_err());

        // Error state is permanent.
        iter.seek(b"anything");
        assert!(!iter.valid());
        assert!(iter.status().is_err());
    }
}
