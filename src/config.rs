//! Configuration options for building and reading tables.

use crate::cache::BlockCache;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter::FilterPolicy;
use std::fmt;
use std::sync::Arc;

/// Options controlling table construction and reads.
#[derive(Clone)]
pub struct Options {
    /// Approximate size of user data packed per data block (in bytes).
    /// Blocks are cut once they reach this size.
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points within a block.
    /// An interval of 1 disables prefix compression entirely.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Compression applied to data blocks.
    /// Default: CompressionType::Snappy (when the feature is enabled)
    pub compression: CompressionType,

    /// Checksum algorithm recorded in each block trailer and the footer.
    /// Default: ChecksumType::Crc32c
    pub checksum: ChecksumType,

    /// Comparator defining key order. Tables must be read with the same
    /// comparator they were built with.
    pub comparator: Arc<dyn Comparator>,

    /// Filter policy for point-lookup pruning.
    /// Set to None to omit the filter block.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Shared cache for decoded data blocks.
    /// Set to None to read blocks from the file on every access.
    pub block_cache: Option<Arc<BlockCache>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024,
            block_restart_interval: 16,
            compression: CompressionType::default(),
            checksum: ChecksumType::Crc32c,
            comparator: Arc::new(BytewiseComparator),
            filter_policy: None,
            block_cache: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .field("checksum", &self.checksum)
            .field("comparator", &self.comparator.name())
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.name()))
            .field("block_cache", &self.block_cache.is_some())
            .finish()
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target data block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart interval for data blocks.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the checksum algorithm.
    pub fn checksum(mut self, checksum: ChecksumType) -> Self {
        self.checksum = checksum;
        self
    }

    /// Sets the comparator.
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Sets the filter policy.
    pub fn filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    /// Sets the shared block cache.
    pub fn block_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.block_cache = Some(cache);
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_restart_interval == 0 {
            return Err(crate::Error::invalid_argument(
                "block_restart_interval must be >= 1",
            ));
        }
        if self.checksum == ChecksumType::XxHash {
            return Err(crate::Error::invalid_argument(
                "xxHash checksums are not supported by this build",
            ));
        }
        Ok(())
    }
}

/// Per-read options.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify block checksums against the stored trailer.
    /// Default: false
    pub verify_checksums: bool,

    /// Insert blocks read from the file into the block cache.
    /// Default: true
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { verify_checksums: false, fill_cache: true }
    }
}

/// Compression algorithms recorded in the one-byte block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from the on-disk trailer byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

/// Checksum algorithms recorded in the footer.
///
/// Legacy-format tables carry no checksum byte and imply
/// [`ChecksumType::Crc32c`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChecksumType {
    /// No checksums; the trailer checksum field is written as zero.
    NoChecksum = 0,

    /// Masked CRC32C (the default).
    Crc32c = 1,

    /// xxHash. Defined on the wire for compatibility; building or
    /// opening a table with it is rejected with InvalidArgument.
    XxHash = 2,
}

impl ChecksumType {
    /// Convert from the on-disk footer byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChecksumType::NoChecksum),
            1 => Some(ChecksumType::Crc32c),
            2 => Some(ChecksumType::XxHash),
            _ => None,
        }
    }
}
