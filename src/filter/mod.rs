//! Filter policies for point-lookup pruning.
//!
//! A filter policy turns a set of keys into a compact membership
//! summary stored in the table's filter block. Probes may return false
//! positives but never false negatives.

pub mod bloom;

pub use bloom::BloomFilterPolicy;

/// Builds and probes per-block-group membership summaries.
pub trait FilterPolicy: Send + Sync {
    /// The name of the policy, recorded in the metaindex and properties
    /// blocks. Changing the filter format requires changing the name.
    fn name(&self) -> &'static str;

    /// Appends a filter summarizing `keys` to `dst`.
    fn create_filter(&self, keys: &[Vec<u8>], dst: &mut Vec<u8>);

    /// Probes a filter previously produced by [`create_filter`].
    ///
    /// Must return `true` for every key that was passed to
    /// `create_filter`; may return `true` for keys that were not.
    ///
    /// [`create_filter`]: FilterPolicy::create_filter
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}
