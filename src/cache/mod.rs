//! Cache module for storing query responses on disk
//!
//! Responses are kept in a bounded directory of plain files, one per query,
//! keyed by a digest of the query text. The cache has no TTL: entries live
//! until they are evicted as the oldest record when the store overflows, or
//! are removed explicitly.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheError, CacheStore, EntryInfo, MAX_ENTRIES};
