//! Table construction: streams sorted entries into the block-based
//! file format.
//!
//! The builder cuts data blocks at the configured size target, defers
//! each block's index entry until the first key of the following block
//! is known (so the comparator can pick a short separator), and tracks
//! the running statistics that end up in the properties block.

use crate::comparator::BytewiseComparator;
use crate::compress::compress;
use crate::config::{ChecksumType, CompressionType, Options};
use crate::env::WritableFile;
use crate::error::{Error, Result};
use crate::table::block::BlockBuilder;
use crate::table::filter_block::FilterBlockBuilder;
use crate::table::footer::{BlockHandle, Footer};
use crate::table::properties::{PropertyCollector, TableProperties};
use crate::table::{BLOCK_TRAILER_SIZE, FILTER_BLOCK_PREFIX, PROPERTIES_BLOCK_NAME};
use crate::util::coding::mask_checksum;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds an immutable table from entries added in strictly increasing
/// key order.
///
/// Call [`add`](Self::add) for every entry, then [`finish`](Self::finish)
/// exactly once. A builder that encountered a write error refuses
/// further operations.
pub struct TableBuilder {
    file: Box<dyn WritableFile>,
    options: Options,
    data_block: BlockBuilder,
    /// Index entries use restart interval 1 so the reader can binary
    /// search separator keys.
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,
    collectors: Vec<Box<dyn PropertyCollector>>,
    /// Last key added, also the last key of the most recently flushed
    /// block until the next add.
    last_key: Vec<u8>,
    /// Handle of the last flushed data block whose index entry is still
    /// pending.
    pending_handle: Option<BlockHandle>,
    offset: u64,
    num_entries: u64,
    num_data_blocks: u64,
    raw_key_size: u64,
    raw_value_size: u64,
    /// On-disk bytes of the data section, trailers included.
    data_size: u64,
    closed: bool,
    /// Description of the first write failure; once set, every further
    /// operation is refused.
    error: Option<String>,
}

impl TableBuilder {
    /// Create a builder writing to `file` with the given options.
    pub fn new(file: Box<dyn WritableFile>, options: Options) -> Result<Self> {
        options.validate()?;

        let data_block =
            BlockBuilder::new(options.block_restart_interval, options.comparator.clone());
        let index_block = BlockBuilder::new(1, options.comparator.clone());
        let filter_block = options
            .filter_policy
            .clone()
            .map(FilterBlockBuilder::new);

        Ok(Self {
            file,
            options,
            data_block,
            index_block,
            filter_block,
            collectors: Vec::new(),
            last_key: Vec::new(),
            pending_handle: None,
            offset: 0,
            num_entries: 0,
            num_data_blocks: 0,
            raw_key_size: 0,
            raw_value_size: 0,
            data_size: 0,
            closed: false,
            error: None,
        })
    }

    /// Register a property collector. Collectors observe every entry
    /// and contribute to the properties block.
    pub fn add_collector(&mut self, collector: Box<dyn PropertyCollector>) {
        self.collectors.push(collector);
    }

    /// Add an entry. Keys must arrive in strictly increasing order
    /// under the configured comparator.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed, "add after finish or abandon");
        self.check_ok()?;

        if self.num_entries > 0 {
            assert_eq!(
                self.options.comparator.compare(key, &self.last_key),
                Ordering::Greater,
                "keys must be added in strictly increasing order"
            );
        }

        // Block boundary check happens before the entry is added, so
        // last_key still names the final key of the block being cut.
        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }

        if let Some(handle) = self.pending_handle.take() {
            let separator = self
                .options
                .comparator
                .find_shortest_separator(&self.last_key, key);
            self.index_block.add(&separator, &handle.encode());
        }

        if let Some(filter) = &mut self.filter_block {
            filter.add_key(key);
        }
        for collector in &mut self.collectors {
            collector.add(key, value)?;
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.data_block.add(key, value);
        self.num_entries += 1;
        self.raw_key_size += key.len() as u64;
        self.raw_value_size += value.len() as u64;

        Ok(())
    }

    /// Force the current data block to disk. A no-op if it is empty.
    pub fn flush(&mut self) -> Result<()> {
        assert!(!self.closed, "flush after finish or abandon");
        self.check_ok()?;

        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(self.pending_handle.is_none());

        let handle = match self.write_data_block() {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e)),
        };
        self.pending_handle = Some(handle);
        self.num_data_blocks += 1;

        if let Some(filter) = &mut self.filter_block {
            filter.start_block(self.offset);
        }
        if let Err(e) = self.file.flush() {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Write all deferred state and the footer. The builder is closed
    /// afterwards whether or not this succeeds.
    pub fn finish(&mut self) -> Result<()> {
        assert!(!self.closed, "finish called twice");
        self.check_ok()?;
        self.flush()?;
        self.closed = true;

        match self.finish_inner() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn finish_inner(&mut self) -> Result<()> {
        // Filter block, raw: filters are already near-incompressible
        // and must be readable without the decompression path.
        let mut filter_handle = None;
        let mut filter_size = 0u64;
        if let Some(filter) = self.filter_block.take() {
            let contents = filter.finish();
            filter_size = contents.len() as u64;
            filter_handle = Some(self.write_raw_block(&contents, CompressionType::None)?);
        }

        // Index entry for the final data block: any short key past the
        // last real key works as its upper bound.
        if let Some(handle) = self.pending_handle.take() {
            let successor = self.options.comparator.find_short_successor(&self.last_key);
            self.index_block.add(&successor, &handle.encode());
        }

        // Properties block. The index block is not on disk yet, so its
        // size is the builder's estimate plus the trailer.
        let mut properties = TableProperties {
            data_size: self.data_size,
            index_size: (self.index_block.current_size_estimate() + BLOCK_TRAILER_SIZE) as u64,
            filter_size,
            raw_key_size: self.raw_key_size,
            raw_value_size: self.raw_value_size,
            num_data_blocks: self.num_data_blocks,
            num_entries: self.num_entries,
            filter_policy_name: self
                .options
                .filter_policy
                .as_ref()
                .map(|p| p.name().to_string())
                .unwrap_or_default(),
            user_collected: BTreeMap::new(),
        };
        for collector in &mut self.collectors {
            for (name, value) in collector.finish()? {
                properties.user_collected.insert(name, value);
            }
        }
        let properties_handle =
            self.write_raw_block(&properties.encode(), CompressionType::None)?;

        // Metaindex block: block name -> handle, names sorted bytewise.
        let mut meta_entries: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        meta_entries.insert(
            PROPERTIES_BLOCK_NAME.to_string(),
            properties_handle.encode(),
        );
        if let (Some(handle), Some(policy)) = (filter_handle, &self.options.filter_policy) {
            meta_entries.insert(
                format!("{}{}", FILTER_BLOCK_PREFIX, policy.name()),
                handle.encode(),
            );
        }
        // Metaindex names are fixed ASCII strings; always bytewise,
        // independent of the table comparator.
        let mut metaindex_block = BlockBuilder::new(1, Arc::new(BytewiseComparator));
        for (name, value) in &meta_entries {
            metaindex_block.add(name.as_bytes(), value);
        }
        let metaindex_contents = metaindex_block.finish().to_vec();
        let metaindex_handle =
            self.write_raw_block(&metaindex_contents, CompressionType::None)?;

        // Index block, compressed like data blocks.
        let index_contents = self.index_block.finish().to_vec();
        let index_handle = self.write_block(&index_contents)?;

        let footer = Footer::new(self.options.checksum, metaindex_handle, index_handle);
        let encoded = footer.encode();
        self.file.append(&encoded)?;
        self.offset += encoded.len() as u64;

        self.file.flush()?;
        self.file.sync()?;
        Ok(())
    }

    /// Discard the table. No further writes are issued; the file's
    /// partial contents are the caller's to clean up.
    pub fn abandon(&mut self) {
        assert!(!self.closed, "abandon after finish or abandon");
        self.closed = true;
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written to the file so far.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    fn write_data_block(&mut self) -> Result<BlockHandle> {
        let contents = self.data_block.finish().to_vec();
        self.data_block.reset();

        let before = self.offset;
        let handle = self.write_block(&contents)?;
        self.data_size += self.offset - before;
        Ok(handle)
    }

    /// Compress `contents` if the configured codec earns its keep: the
    /// compressed form must be smaller than raw by at least 12.5%.
    fn write_block(&mut self, contents: &[u8]) -> Result<BlockHandle> {
        let ty = self.options.compression;
        match compress(ty, contents)? {
            Some(compressed) if compressed.len() < contents.len() - contents.len() / 8 => {
                self.write_raw_block(&compressed, ty)
            }
            _ => self.write_raw_block(contents, CompressionType::None),
        }
    }

    fn write_raw_block(
        &mut self,
        payload: &[u8],
        ty: CompressionType,
    ) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, payload.len() as u64);

        self.file.append(payload)?;
        let type_byte = [ty as u8];
        self.file.append(&type_byte)?;

        let checksum = match self.options.checksum {
            ChecksumType::NoChecksum => 0,
            ChecksumType::Crc32c => {
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(payload);
                hasher.update(&type_byte);
                mask_checksum(hasher.finalize())
            }
            // Rejected by Options::validate.
            ChecksumType::XxHash => {
                return Err(Error::invalid_argument("xxhash checksums not supported"))
            }
        };
        self.file.append(&checksum.to_le_bytes())?;

        self.offset += payload.len() as u64 + BLOCK_TRAILER_SIZE as u64;
        Ok(handle)
    }

    fn check_ok(&self) -> Result<()> {
        match &self.error {
            Some(msg) => Err(Error::invalid_state(format!(
                "builder poisoned by earlier failure: {}",
                msg
            ))),
            None => Ok(()),
        }
    }

    fn fail(&mut self, e: Error) -> Error {
        log::error!("table build failed at offset {}: {}", self.offset, e);
        self.error = Some(e.to_string());
        e
    }
}
