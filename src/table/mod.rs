//! Block-based table: an immutable, sorted key-value file format.
//!
//! Tables are built once by a [`TableBuilder`] streaming sorted entries
//! to an append-only file, then served by any number of concurrent
//! [`TableReader`]s.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]
//! [Data Block 2]
//! ...
//! [Data Block N]
//! [Filter Block]     // optional, per filter policy
//! [Properties Block] // counters and collector output
//! [Metaindex Block]  // auxiliary block name -> handle
//! [Index Block]      // separator key -> data block handle
//! [Footer]           // fixed-size trailer, magic number
//! ```
//!
//! Every block is followed by a 5-byte trailer: a one-byte compression
//! type and a 4-byte masked checksum covering the payload and the type
//! byte. The index block uses restart interval 1 so lookups can binary
//! search separator keys directly.

pub mod block;
pub mod builder;
pub mod filter_block;
pub mod footer;
pub mod properties;
pub mod reader;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use builder::TableBuilder;
pub use filter_block::{FilterBlockBuilder, FilterBlockReader};
pub use footer::{BlockHandle, Footer};
pub use properties::{PropertyCollector, TableProperties};
pub use reader::{TableIterator, TableReader};

/// Magic number identifying current-format block-based table files.
pub const TABLE_MAGIC_NUMBER: u64 = 0x8c3a_55d1_42e9_07bf;

/// Magic number of the legacy format (no checksum byte, implied CRC32C).
pub const LEGACY_TABLE_MAGIC_NUMBER: u64 = 0x75ab_11c8_39f0_62de;

/// Bytes appended after every block payload:
/// 1-byte compression type + 4-byte masked checksum.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Log2 of the file-offset range covered by one filter (2KiB groups).
pub const FILTER_BASE_LG: u32 = 11;

/// Metaindex entry name of the properties block.
pub const PROPERTIES_BLOCK_NAME: &str = "blocktable.properties";

/// Metaindex entry name prefix of the filter block; the filter policy
/// name is appended.
pub const FILTER_BLOCK_PREFIX: &str = "filter.";
