//! Table properties: per-file metadata embedded in a dedicated block.
//!
//! Properties are rebuilt from the builder's running counters at
//! finish time and serialized as an ordinary block with restart
//! interval 1, entries sorted bytewise by property name. Numeric values
//! are varint64-encoded; string values are stored raw.

use crate::comparator::BytewiseComparator;
use crate::error::{Error, Result};
use crate::table::block::{Block, BlockBuilder};
use crate::util::coding::{decode_varint64, put_varint64};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Property name: on-disk size of the data section (as-stored block
/// payloads plus trailers).
pub const PROP_DATA_SIZE: &str = "blocktable.data.size";
/// Property name: size of the index block.
pub const PROP_INDEX_SIZE: &str = "blocktable.index.size";
/// Property name: size of the filter block.
pub const PROP_FILTER_SIZE: &str = "blocktable.filter.size";
/// Property name: total size of all keys as added.
pub const PROP_RAW_KEY_SIZE: &str = "blocktable.raw.key.size";
/// Property name: total size of all values as added.
pub const PROP_RAW_VALUE_SIZE: &str = "blocktable.raw.value.size";
/// Property name: number of data blocks.
pub const PROP_NUM_DATA_BLOCKS: &str = "blocktable.num.data.blocks";
/// Property name: number of entries.
pub const PROP_NUM_ENTRIES: &str = "blocktable.num.entries";
/// Property name: name of the filter policy, empty if none.
pub const PROP_FILTER_POLICY: &str = "blocktable.filter.policy";

/// Table-level metadata recorded at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableProperties {
    /// On-disk size of the data section: block payloads as stored
    /// (post-compression) plus their trailers.
    pub data_size: u64,
    /// Size of the index block.
    pub index_size: u64,
    /// Size of the filter block (0 when absent).
    pub filter_size: u64,
    /// Sum of key lengths across all entries.
    pub raw_key_size: u64,
    /// Sum of value lengths across all entries.
    pub raw_value_size: u64,
    /// Number of data blocks written.
    pub num_data_blocks: u64,
    /// Number of entries added.
    pub num_entries: u64,
    /// Name of the filter policy, empty if no filter was built.
    pub filter_policy_name: String,
    /// Properties contributed by user collectors.
    pub user_collected: BTreeMap<String, Vec<u8>>,
}

impl TableProperties {
    /// Serialize into a block payload (restart interval 1, names sorted
    /// bytewise). User-collected entries never shadow built-in names.
    pub fn encode(&self) -> Bytes {
        let mut entries: BTreeMap<String, Vec<u8>> = self.user_collected.clone();

        let mut put_u64 = |entries: &mut BTreeMap<String, Vec<u8>>, name: &str, value: u64| {
            let mut buf = Vec::new();
            put_varint64(&mut buf, value);
            entries.insert(name.to_string(), buf);
        };

        put_u64(&mut entries, PROP_DATA_SIZE, self.data_size);
        put_u64(&mut entries, PROP_INDEX_SIZE, self.index_size);
        put_u64(&mut entries, PROP_FILTER_SIZE, self.filter_size);
        put_u64(&mut entries, PROP_RAW_KEY_SIZE, self.raw_key_size);
        put_u64(&mut entries, PROP_RAW_VALUE_SIZE, self.raw_value_size);
        put_u64(&mut entries, PROP_NUM_DATA_BLOCKS, self.num_data_blocks);
        put_u64(&mut entries, PROP_NUM_ENTRIES, self.num_entries);
        entries.insert(
            PROP_FILTER_POLICY.to_string(),
            self.filter_policy_name.as_bytes().to_vec(),
        );

        let mut builder = BlockBuilder::new(1, Arc::new(BytewiseComparator));
        for (name, value) in &entries {
            builder.add(name.as_bytes(), value);
        }
        Bytes::copy_from_slice(builder.finish())
    }

    /// Parse a properties block payload.
    pub fn decode(data: Bytes) -> Result<Self> {
        let block = Block::new(data)?;
        let mut iter = block.iter(Arc::new(BytewiseComparator));

        let mut props = TableProperties::default();
        iter.seek_to_first();
        while iter.valid() {
            let name = std::str::from_utf8(iter.key())
                .map_err(|_| Error::corruption("non-utf8 property name"))?
                .to_string();
            let value = iter.value();

            let mut numeric = |dst: &mut u64| -> Result<()> {
                let (v, _) = decode_varint64(value)
                    .ok_or_else(|| Error::corruption(format!("bad property value: {}", name)))?;
                *dst = v;
                Ok(())
            };

            match name.as_str() {
                PROP_DATA_SIZE => numeric(&mut props.data_size)?,
                PROP_INDEX_SIZE => numeric(&mut props.index_size)?,
                PROP_FILTER_SIZE => numeric(&mut props.filter_size)?,
                PROP_RAW_KEY_SIZE => numeric(&mut props.raw_key_size)?,
                PROP_RAW_VALUE_SIZE => numeric(&mut props.raw_value_size)?,
                PROP_NUM_DATA_BLOCKS => numeric(&mut props.num_data_blocks)?,
                PROP_NUM_ENTRIES => numeric(&mut props.num_entries)?,
                PROP_FILTER_POLICY => {
                    props.filter_policy_name = String::from_utf8_lossy(value).into_owned();
                }
                _ => {
                    props.user_collected.insert(name.clone(), value.to_vec());
                }
            }
            iter.next();
        }
        iter.status()?;

        Ok(props)
    }
}

/// Pluggable per-entry statistics collector.
///
/// A collector observes every entry added to a table builder and
/// contributes named properties to the properties block at finish.
pub trait PropertyCollector {
    /// The collector's name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Observe one entry. Called once per [`TableBuilder::add`].
    ///
    /// [`TableBuilder::add`]: crate::table::TableBuilder::add
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Produce the collected properties. Called once at finish.
    fn finish(&mut self) -> Result<Vec<(String, Vec<u8>)>>;
}
