//! Filter block: per-table membership summaries grouped by file offset.
//!
//! One filter is generated per 2KiB range of data-block start offsets
//! (`FILTER_BASE_LG`). Reads map a data block's offset to its covering
//! filter and probe it before touching the block.
//!
//! Format:
//! ```text
//! [filter 0]
//! ...
//! [filter N-1]
//! [offset of filter 0: u32]
//! ...
//! [offset of filter N-1: u32]
//! [offset of offset array: u32]
//! [base_lg: 1 byte]
//! ```

use crate::filter::FilterPolicy;
use crate::table::FILTER_BASE_LG;
use crate::util::coding::get_fixed32;
use bytes::Bytes;
use std::sync::Arc;

/// Accumulates keys and emits one filter per block group.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Keys buffered for the current group.
    keys: Vec<Vec<u8>>,
    /// Serialized filters so far.
    result: Vec<u8>,
    /// Byte offset of each filter within `result`.
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    /// Create a builder emitting filters from `policy`.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self { policy, keys: Vec::new(), result: Vec::new(), filter_offsets: Vec::new() }
    }

    /// Declare that a data block begins at `block_offset`. Must be
    /// called with non-decreasing offsets; closes out filter groups the
    /// new block does not belong to.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = (block_offset >> FILTER_BASE_LG) as usize;
        debug_assert!(filter_index >= self.filter_offsets.len());
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    /// Buffer a key into the current filter group.
    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    /// Serialize all filters plus the offset table.
    pub fn finish(mut self) -> Bytes {
        if !self.keys.is_empty() {
            self.generate_filter();
        }

        let array_offset = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            self.result.extend_from_slice(&offset.to_le_bytes());
        }
        self.result.extend_from_slice(&array_offset.to_le_bytes());
        self.result.push(FILTER_BASE_LG as u8);

        Bytes::from(self.result)
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.keys.is_empty() {
            // Empty group: the repeated offset encodes a zero-length
            // filter, which the reader treats as "definitely absent".
            return;
        }
        self.policy.create_filter(&self.keys, &mut self.result);
        self.keys.clear();
    }
}

/// Probes a serialized filter block.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Bytes,
    /// Start of the offset array within `data`.
    offset_array_start: usize,
    /// Number of filters.
    num_filters: usize,
    base_lg: u32,
}

impl FilterBlockReader {
    /// Wrap serialized filter block contents. Malformed contents yield
    /// a reader that matches nothing or everything but never panics.
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Bytes) -> Self {
        let mut reader = Self {
            policy,
            data: Bytes::new(),
            offset_array_start: 0,
            num_filters: 0,
            base_lg: 0,
        };

        let n = data.len();
        if n < 5 {
            return reader;
        }

        // A base_lg that would overflow the offset shift means the
        // trailer is garbage; stay in the degraded state.
        let base_lg = data[n - 1] as u32;
        if base_lg >= u64::BITS {
            return reader;
        }
        let array_offset = get_fixed32(&data, n - 5).unwrap() as usize;
        if array_offset > n - 5 {
            return reader;
        }

        reader.base_lg = base_lg;
        reader.offset_array_start = array_offset;
        reader.num_filters = (n - 5 - array_offset) / 4;
        reader.data = data;
        reader
    }

    /// Test whether the filter covering the data block at
    /// `block_offset` may contain `key`.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            // Out of range: treat as a match rather than risk a false
            // negative.
            return true;
        }

        let start =
            get_fixed32(&self.data, self.offset_array_start + index * 4).unwrap() as usize;
        let limit =
            get_fixed32(&self.data, self.offset_array_start + index * 4 + 4).unwrap() as usize;

        if start == limit {
            // Empty filter covers no keys.
            return false;
        }
        if start < limit && limit <= self.offset_array_start {
            let filter = &self.data[start..limit];
            return self.policy.key_may_match(key, filter);
        }

        // Inconsistent offsets: err on the side of matching.
        true
    }
}
