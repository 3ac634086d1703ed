//! # blocktable
//!
//! An embeddable, immutable sorted-table file format: sorted key-value
//! entries packed into prefix-compressed blocks, indexed by a two-level
//! lookup structure and guarded by per-block checksums.
//!
//! ## Features
//!
//! - Prefix-compressed blocks with restart points for binary search
//! - Two-level index with comparator-shortened separator keys
//! - Optional bloom filter block to short-circuit point lookups
//! - Per-block masked CRC32C checksums, verified on demand
//! - Optional Snappy or LZ4 block compression (feature-gated)
//! - Shared LRU cache for decoded block contents
//! - Embedded properties block with build-time statistics
//!
//! ## Example
//!
//! ```no_run
//! use blocktable::{FsRandomAccessFile, FsWritableFile, Options, ReadOptions};
//! use blocktable::{TableBuilder, TableReader};
//! use std::sync::Arc;
//!
//! # fn main() -> blocktable::Result<()> {
//! let options = Options::new();
//!
//! let file = FsWritableFile::create("data.tbl")?;
//! let mut builder = TableBuilder::new(Box::new(file), options.clone())?;
//! builder.add(b"apple", b"red")?;
//! builder.add(b"banana", b"yellow")?;
//! builder.finish()?;
//!
//! let file = FsRandomAccessFile::open("data.tbl")?;
//! let size = file.len()?;
//! let reader = TableReader::open(Arc::new(file), size, options)?;
//! let value = reader.get(&ReadOptions::default(), b"apple")?;
//! assert_eq!(value.as_deref(), Some(b"red".as_slice()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cache;
pub mod comparator;
pub mod compress;
pub mod config;
pub mod env;
pub mod error;
pub mod filter;
pub mod table;
pub mod util;

pub use cache::{BlockCache, CacheStats};
pub use comparator::{BytewiseComparator, Comparator};
pub use config::{ChecksumType, CompressionType, Options, ReadOptions};
pub use env::{FsRandomAccessFile, FsWritableFile, RandomAccessFile, WritableFile};
pub use error::{Error, Result};
pub use filter::{BloomFilterPolicy, FilterPolicy};
pub use table::{
    PropertyCollector, TableBuilder, TableIterator, TableProperties, TableReader,
};
