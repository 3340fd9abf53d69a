//! Storage contracts for the tree structures.
//!
//! The log tree and accumulator never talk to a database directly; they go
//! through these traits so the server's buffered store, or any test
//! stand-in, can back them. Backend failures are carried as opaque
//! [`anyhow::Error`]s and propagated untouched.

use anyhow::Result;
use std::collections::HashMap;

/// Chunk storage for a log tree, keyed by the chunk's root index.
///
/// Absent chunks are simply missing from the returned map; callers decide
/// whether that is significant.
pub trait LogStore {
    fn batch_get_chunks(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u8>>>;

    fn put_chunk(&mut self, id: u64, data: Vec<u8>) -> Result<()>;
}

/// Storage for the accumulator: the underlying log's chunks plus raw search
/// entries by log position and a by-key position cache.
pub trait SearchStore: LogStore {
    fn batch_get_entries(&self, positions: &[u64]) -> Result<HashMap<u64, Vec<u8>>>;

    fn put_entry(&mut self, position: u64, data: Vec<u8>) -> Result<()>;

    fn cache_lookup(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn cache_store(&mut self, key: &str, data: Vec<u8>) -> Result<()>;
}

impl<T: LogStore + ?Sized> LogStore for &mut T {
    fn batch_get_chunks(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        (**self).batch_get_chunks(ids)
    }

    fn put_chunk(&mut self, id: u64, data: Vec<u8>) -> Result<()> {
        (**self).put_chunk(id, data)
    }
}

impl<T: SearchStore + ?Sized> SearchStore for &mut T {
    fn batch_get_entries(&self, positions: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        (**self).batch_get_entries(positions)
    }

    fn put_entry(&mut self, position: u64, data: Vec<u8>) -> Result<()> {
        (**self).put_entry(position, data)
    }

    fn cache_lookup(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).cache_lookup(key)
    }

    fn cache_store(&mut self, key: &str, data: Vec<u8>) -> Result<()> {
        (**self).cache_store(key, data)
    }
}
