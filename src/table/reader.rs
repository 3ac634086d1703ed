//! Table reading: random point lookups and ordered scans over a
//! finished table file.
//!
//! Opening a table reads and validates the footer, the metaindex, the
//! properties block and (if a policy is configured) the filter block,
//! and pins the index block in memory. Data blocks are fetched lazily,
//! optionally through a shared [`BlockCache`](crate::cache::BlockCache).

use crate::cache::{new_cache_id, CacheKey};
use crate::comparator::BytewiseComparator;
use crate::compress::decompress;
use crate::config::{ChecksumType, CompressionType, Options, ReadOptions};
use crate::env::RandomAccessFile;
use crate::error::{Error, Result};
use crate::table::block::{Block, BlockIterator};
use crate::table::filter_block::FilterBlockReader;
use crate::table::footer::{BlockHandle, Footer};
use crate::table::properties::TableProperties;
use crate::table::{BLOCK_TRAILER_SIZE, FILTER_BLOCK_PREFIX, PROPERTIES_BLOCK_NAME};
use crate::util::coding::{get_fixed32, unmask_checksum};
use bytes::Bytes;
use std::cmp::Ordering;
use std::sync::Arc;

/// Read-only access to one table file.
///
/// Cheap to share: all methods take `&self` and the reader is
/// `Send + Sync` when its file is.
pub struct TableReader {
    options: Options,
    file: Arc<dyn RandomAccessFile>,
    footer: Footer,
    index_block: Block,
    filter: Option<FilterBlockReader>,
    properties: TableProperties,
    cache_id: u64,
}

impl TableReader {
    /// Open a table of `file_size` bytes stored in `file`.
    ///
    /// Metadata blocks are always checksum-verified when the file
    /// carries checksums; data blocks follow [`ReadOptions`].
    pub fn open(
        file: Arc<dyn RandomAccessFile>,
        file_size: u64,
        options: Options,
    ) -> Result<Self> {
        options.validate()?;

        if file_size < Footer::LEGACY_ENCODED_LENGTH as u64 {
            return Err(Error::corruption("file too short to be a table"));
        }
        let footer_len = (Footer::ENCODED_LENGTH as u64).min(file_size);
        let footer_input = file.read(file_size - footer_len, footer_len as usize)?;
        let footer = Footer::decode(&footer_input)?;

        let mut reader = Self {
            options,
            file,
            footer,
            index_block: Block::new(empty_block_contents())?,
            filter: None,
            properties: TableProperties::default(),
            cache_id: new_cache_id(),
        };

        let metaindex_contents = reader.read_block_contents(reader.footer.metaindex_handle, true)?;
        reader.read_meta(Block::new(metaindex_contents)?)?;

        let index_contents = reader.read_block_contents(reader.footer.index_handle, true)?;
        reader.index_block = Block::new(index_contents)?;

        log::debug!(
            "opened table: {} entries, {} data blocks, filter={:?}",
            reader.properties.num_entries,
            reader.properties.num_data_blocks,
            reader.properties.filter_policy_name,
        );
        Ok(reader)
    }

    /// Walk the metaindex and load the blocks it names.
    fn read_meta(&mut self, metaindex: Block) -> Result<()> {
        // Metaindex entries are always bytewise-ordered, independent of
        // the table comparator.
        let mut iter = metaindex.iter(Arc::new(BytewiseComparator));
        iter.seek_to_first();
        while iter.valid() {
            let name = iter.key().to_vec();
            let (handle, _) = BlockHandle::decode(iter.value())?;

            if name == PROPERTIES_BLOCK_NAME.as_bytes() {
                let contents = self.read_block_contents(handle, true)?;
                self.properties = TableProperties::decode(contents)?;
            } else if let Some(policy) = &self.options.filter_policy {
                let expected = format!("{}{}", FILTER_BLOCK_PREFIX, policy.name());
                if name == expected.as_bytes() {
                    let contents = self.read_block_contents(handle, true)?;
                    self.filter = Some(FilterBlockReader::new(policy.clone(), contents));
                }
            }
            iter.next();
        }
        iter.status()
    }

    /// Point lookup. Returns the value for `key`, or `None` if the
    /// table cannot contain it.
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut index_iter = self.index_block.iter(self.options.comparator.clone());
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }

        let (handle, _) = BlockHandle::decode(index_iter.value())?;
        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset, key) {
                return Ok(None);
            }
        }

        let block = self.read_data_block(handle, read_options)?;
        let mut block_iter = block.iter(self.options.comparator.clone());
        block_iter.seek(key);
        if block_iter.valid() && self.options.comparator.compare(block_iter.key(), key) == Ordering::Equal
        {
            return Ok(Some(block_iter.value().to_vec()));
        }
        block_iter.status()?;
        Ok(None)
    }

    /// Create an ordered iterator over the whole table.
    pub fn iter(&self, read_options: ReadOptions) -> TableIterator<'_> {
        TableIterator {
            reader: self,
            read_options,
            index_iter: self.index_block.iter(self.options.comparator.clone()),
            data_iter: None,
            error: None,
        }
    }

    /// Approximate file offset at which `key` would live. Monotone in
    /// the key; useful for sizing range scans.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let mut index_iter = self.index_block.iter(self.options.comparator.clone());
        index_iter.seek(key);
        if index_iter.valid() {
            if let Ok((handle, _)) = BlockHandle::decode(index_iter.value()) {
                return handle.offset;
            }
        }
        // Past every data block: the metaindex marks the end of the
        // data section.
        self.footer.metaindex_handle.offset
    }

    /// The properties recorded when the table was built.
    pub fn properties(&self) -> &TableProperties {
        &self.properties
    }

    /// Number of data blocks in the file.
    pub fn num_data_blocks(&self) -> u64 {
        self.properties.num_data_blocks
    }

    /// Fetch a data block, consulting the block cache first.
    fn read_data_block(&self, handle: BlockHandle, read_options: &ReadOptions) -> Result<Block> {
        let Some(cache) = &self.options.block_cache else {
            let contents = self.read_block_contents(handle, read_options.verify_checksums)?;
            return Block::new(contents);
        };

        let key = CacheKey::new(self.cache_id, handle.offset);
        if let Some(contents) = cache.get(&key) {
            return Block::new(contents);
        }

        let contents = self.read_block_contents(handle, read_options.verify_checksums)?;
        if read_options.fill_cache {
            cache.insert(key, contents.clone());
        }
        Block::new(contents)
    }

    /// Read one block plus its trailer, verify, and decompress.
    fn read_block_contents(&self, handle: BlockHandle, verify: bool) -> Result<Bytes> {
        let len = handle.size as usize + BLOCK_TRAILER_SIZE;
        let raw = self.file.read(handle.offset, len)?;
        if raw.len() != len {
            return Err(Error::corruption("truncated block read"));
        }

        let payload = &raw[..handle.size as usize];
        let type_byte = raw[handle.size as usize];
        let stored = get_fixed32(&raw, handle.size as usize + 1)
            .ok_or_else(|| Error::corruption("truncated block trailer"))?;

        if verify && self.footer.checksum == ChecksumType::Crc32c {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(payload);
            hasher.update(&[type_byte]);
            let actual = hasher.finalize();
            let expected = unmask_checksum(stored);
            if actual != expected {
                return Err(Error::ChecksumMismatch { expected, actual });
            }
        }

        let ty = CompressionType::from_u8(type_byte)
            .ok_or_else(|| Error::corruption(format!("unknown compression type: {}", type_byte)))?;
        match ty {
            CompressionType::None => Ok(raw.slice(..handle.size as usize)),
            _ => Ok(Bytes::from(decompress(ty, payload)?)),
        }
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("num_entries", &self.properties.num_entries)
            .field("num_data_blocks", &self.properties.num_data_blocks)
            .field("checksum", &self.footer.checksum)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

/// Serialized contents of an empty block: no entries, one restart.
fn empty_block_contents() -> Bytes {
    let mut buf = Vec::with_capacity(8);
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    Bytes::from(buf)
}

/// Ordered, bidirectional cursor over a table.
///
/// A two-level iterator: the index block positions a data-block
/// iterator, which yields the actual entries. Empty data blocks are
/// skipped transparently in either direction.
pub struct TableIterator<'a> {
    reader: &'a TableReader,
    read_options: ReadOptions,
    index_iter: BlockIterator,
    data_iter: Option<BlockIterator>,
    error: Option<String>,
}

impl TableIterator<'_> {
    /// True if the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.error.is_none() && self.data_iter.as_ref().map_or(false, |it| it.valid())
    }

    /// The error that invalidated the iterator, if any.
    pub fn status(&self) -> Result<()> {
        if let Some(msg) = &self.error {
            return Err(Error::corruption(msg.clone()));
        }
        self.index_iter.status()?;
        if let Some(it) = &self.data_iter {
            it.status()?;
        }
        Ok(())
    }

    /// The current entry's key. Requires [`valid`](Self::valid).
    pub fn key(&self) -> &[u8] {
        assert!(self.valid(), "iterator not valid");
        self.data_iter.as_ref().expect("valid implies data iter").key()
    }

    /// The current entry's value. Requires [`valid`](Self::valid).
    pub fn value(&self) -> &[u8] {
        assert!(self.valid(), "iterator not valid");
        self.data_iter.as_ref().expect("valid implies data iter").value()
    }

    /// Position at the first entry with key >= `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek(target);
        }
        self.skip_empty_blocks_forward();
    }

    /// Position at the first entry.
    pub fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek_to_first();
        }
        self.skip_empty_blocks_forward();
    }

    /// Position at the last entry.
    pub fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek_to_last();
        }
        self.skip_empty_blocks_backward();
    }

    /// Advance to the next entry. Requires [`valid`](Self::valid).
    pub fn next(&mut self) {
        assert!(self.valid(), "iterator not valid");
        self.data_iter.as_mut().expect("valid implies data iter").next();
        self.skip_empty_blocks_forward();
    }

    /// Step back to the previous entry. Requires [`valid`](Self::valid).
    pub fn prev(&mut self) {
        assert!(self.valid(), "iterator not valid");
        self.data_iter.as_mut().expect("valid implies data iter").prev();
        self.skip_empty_blocks_backward();
    }

    /// Load the data block the index iterator points at.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            return;
        }
        match BlockHandle::decode(self.index_iter.value())
            .and_then(|(handle, _)| self.reader.read_data_block(handle, &self.read_options))
        {
            Ok(block) => {
                self.data_iter = Some(block.iter(self.reader.options.comparator.clone()));
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.data_iter = None;
            }
        }
    }

    fn skip_empty_blocks_forward(&mut self) {
        while self.error.is_none()
            && self.data_iter.as_ref().map_or(true, |it| !it.valid())
        {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(it) = &mut self.data_iter {
                it.seek_to_first();
            } else {
                return;
            }
        }
    }

    fn skip_empty_blocks_backward(&mut self) {
        while self.error.is_none()
            && self.data_iter.as_ref().map_or(true, |it| !it.valid())
        {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(it) = &mut self.data_iter {
                it.seek_to_last();
            } else {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BlockCache;
    use crate::config::CompressionType;
    use crate::env::WritableFile;
    use crate::filter::BloomFilterPolicy;
    use crate::table::builder::TableBuilder;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemFile {
        data: Arc<Mutex<Vec<u8>>>,
    }

    impl WritableFile for MemFile {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.data.lock().unwrap().extend_from_slice(data);
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn sync(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct MemRandomFile {
        data: Vec<u8>,
    }

    impl RandomAccessFile for MemRandomFile {
        fn read(&self, offset: u64, len: usize) -> Result<Bytes> {
            let start = offset as usize;
            let end = start + len;
            if end > self.data.len() {
                return Err(Error::corruption("read past end of file"));
            }
            Ok(Bytes::copy_from_slice(&self.data[start..end]))
        }
    }

    fn build_table(entries: &[(&[u8], &[u8])], options: &Options) -> Vec<u8> {
        let file = MemFile::default();
        let sink = file.clone();
        let mut builder = TableBuilder::new(Box::new(file), options.clone()).unwrap();
        for (k, v) in entries {
            builder.add(k, v).unwrap();
        }
        builder.finish().unwrap();
        let data = sink.data.lock().unwrap().clone();
        assert_eq!(data.len() as u64, builder.file_size());
        data
    }

    fn open_table(data: Vec<u8>, options: Options) -> TableReader {
        let len = data.len() as u64;
        let file = Arc::new(MemRandomFile { data });
        TableReader::open(file, len, options).unwrap()
    }

    fn sample_entries() -> Vec<(Vec<u8>, Vec<u8>)> {
        (0..200u32)
            .map(|i| {
                (
                    format!("key{:05}", i).into_bytes(),
                    format!("value-{}", i).into_bytes(),
                )
            })
            .collect()
    }

    fn sample_options() -> Options {
        Options::new()
            .block_size(256)
            .compression(CompressionType::None)
    }

    fn sample_table(options: &Options) -> TableReader {
        let entries = sample_entries();
        let refs: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        open_table(build_table(&refs, options), options.clone())
    }

    #[test]
    fn test_get_every_key() {
        let options = sample_options();
        let reader = sample_table(&options);
        let read_options = ReadOptions::default();

        for (key, value) in sample_entries() {
            let got = reader.get(&read_options, &key).unwrap();
            assert_eq!(got.as_deref(), Some(value.as_slice()));
        }
        assert!(reader.get(&read_options, b"absent").unwrap().is_none());
        assert!(reader.get(&read_options, b"zzz").unwrap().is_none());
    }

    #[test]
    fn test_full_forward_scan() {
        let options = sample_options();
        let reader = sample_table(&options);
        let mut iter = reader.iter(ReadOptions::default());

        let mut seen = Vec::new();
        iter.seek_to_first();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        iter.status().unwrap();
        assert_eq!(seen, sample_entries());
    }

    #[test]
    fn test_full_backward_scan() {
        let options = sample_options();
        let reader = sample_table(&options);
        let mut iter = reader.iter(ReadOptions::default());

        let mut seen = Vec::new();
        iter.seek_to_last();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.prev();
        }
        iter.status().unwrap();

        seen.reverse();
        assert_eq!(seen, sample_entries());
    }

    #[test]
    fn test_seek_lands_on_next_key() {
        let options = sample_options();
        let reader = sample_table(&options);
        let mut iter = reader.iter(ReadOptions::default());

        iter.seek(b"key00100");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key00100");

        // Between two keys: lands on the following one.
        iter.seek(b"key00100a");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key00101");

        // Before the first key.
        iter.seek(b"a");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key00000");

        // Past the last key.
        iter.seek(b"zzz");
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    #[test]
    fn test_mixed_direction_walk() {
        let options = sample_options();
        let reader = sample_table(&options);
        let mut iter = reader.iter(ReadOptions::default());

        iter.seek(b"key00050");
        assert_eq!(iter.key(), b"key00050");
        iter.next();
        assert_eq!(iter.key(), b"key00051");
        iter.prev();
        assert_eq!(iter.key(), b"key00050");
        iter.prev();
        assert_eq!(iter.key(), b"key00049");
    }

    #[test]
    fn test_prev_from_first_invalidates() {
        let options = sample_options();
        let reader = sample_table(&options);
        let mut iter = reader.iter(ReadOptions::default());

        iter.seek_to_first();
        assert!(iter.valid());
        iter.prev();
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    #[test]
    fn test_empty_table() {
        let options = sample_options();
        let reader = open_table(build_table(&[], &options), options);

        assert_eq!(reader.properties().num_entries, 0);
        assert!(reader
            .get(&ReadOptions::default(), b"anything")
            .unwrap()
            .is_none());

        let mut iter = reader.iter(ReadOptions::default());
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek_to_last();
        assert!(!iter.valid());
        iter.seek(b"x");
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    #[test]
    fn test_properties_counters() {
        let options = sample_options();
        let reader = sample_table(&options);
        let props = reader.properties();

        assert_eq!(props.num_entries, 200);
        assert!(props.num_data_blocks > 1);
        assert_eq!(props.raw_key_size, 200 * 8);
        assert!(props.raw_value_size > 0);
        assert_eq!(props.filter_policy_name, "");
    }

    #[test]
    fn test_filter_backed_get() {
        let options = sample_options().filter_policy(Arc::new(BloomFilterPolicy::default()));
        let reader = sample_table(&options);
        let read_options = ReadOptions::default();

        assert!(reader.filter.is_some());
        assert_eq!(
            reader.properties().filter_policy_name,
            "blocktable.BuiltinBloomFilter"
        );

        for (key, value) in sample_entries() {
            let got = reader.get(&read_options, &key).unwrap();
            assert_eq!(got.as_deref(), Some(value.as_slice()));
        }
        assert!(reader.get(&read_options, b"key99999x").unwrap().is_none());
    }

    #[test]
    fn test_block_cache_hits() {
        let cache = Arc::new(BlockCache::new(1 << 20));
        let options = sample_options().block_cache(cache.clone());
        let reader = sample_table(&options);
        let read_options = ReadOptions::default();

        reader.get(&read_options, b"key00000").unwrap();
        reader.get(&read_options, b"key00000").unwrap();

        let stats = cache.stats();
        assert!(stats.hits >= 1, "second get should hit the cache");
        assert!(cache.len() > 0);
    }

    #[test]
    fn test_fill_cache_false_leaves_cache_empty() {
        let cache = Arc::new(BlockCache::new(1 << 20));
        let options = sample_options().block_cache(cache.clone());
        let reader = sample_table(&options);

        let read_options = ReadOptions { fill_cache: false, ..Default::default() };
        reader.get(&read_options, b"key00000").unwrap();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let options = sample_options();
        let entries = sample_entries();
        let refs: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        let mut data = build_table(&refs, &options);

        // Flip a byte in the first data block payload.
        data[3] ^= 0xff;

        let reader = open_table(data, options);
        let verify = ReadOptions { verify_checksums: true, ..Default::default() };
        let err = reader.get(&verify, b"key00000").unwrap_err();
        assert!(err.is_corruption(), "expected corruption, got {}", err);
    }

    #[test]
    fn test_unverified_read_skips_checksum() {
        let options = sample_options();
        let entries = sample_entries();
        let refs: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        let mut data = build_table(&refs, &options);

        // Corrupt only the stored checksum of the first block, leaving
        // the payload intact.
        let first_block_size = {
            let reader = open_table(data.clone(), options.clone());
            let mut index_iter = reader.index_block.iter(options.comparator.clone());
            index_iter.seek_to_first();
            BlockHandle::decode(index_iter.value()).unwrap().0.size as usize
        };
        data[first_block_size + 1] ^= 0xff; // first checksum byte

        let reader = open_table(data, options);
        let got = reader
            .get(&ReadOptions::default(), b"key00000")
            .unwrap();
        assert_eq!(got.as_deref(), Some(b"value-0".as_slice()));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let options = sample_options();
        let err = TableReader::open(
            Arc::new(MemRandomFile { data: vec![0u8; 10] }),
            10,
            options,
        )
        .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_approximate_offsets_monotone() {
        let options = sample_options();
        let reader = sample_table(&options);

        let mut last = 0u64;
        for i in (0..200u32).step_by(10) {
            let key = format!("key{:05}", i).into_bytes();
            let offset = reader.approximate_offset_of(&key);
            assert!(offset >= last, "offsets must be monotone");
            last = offset;
        }

        // Past the end: approximately the end of the data section.
        let end = reader.approximate_offset_of(b"zzz");
        assert!(end >= last);
        assert_eq!(end, reader.footer.metaindex_handle.offset);
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_compressed_round_trip() {
        let options = Options::new()
            .block_size(256)
            .compression(CompressionType::Snappy);
        let reader = sample_table(&options);
        let read_options = ReadOptions { verify_checksums: true, ..Default::default() };

        for (key, value) in sample_entries() {
            let got = reader.get(&read_options, &key).unwrap();
            assert_eq!(got.as_deref(), Some(value.as_slice()));
        }
    }
}
