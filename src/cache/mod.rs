//! Caching of decoded block contents.

mod lru;

pub use lru::{new_cache_id, BlockCache, CacheKey, CacheStats};
