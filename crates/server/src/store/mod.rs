//! The buffered storage facade.
//!
//! Every mutation lands in an in-memory buffer owned by one
//! [`TransparencyStore`] instance. `commit()` flushes the buffer as a single
//! backend batch and only then writes the `tree-head` key, making the head
//! the linearization point: a reader that observes a new head is guaranteed
//! to see everything the head commits to, and a crash between the batch and
//! the head write leaves readers on the prior epoch.
//!
//! Key scheme: `l<chunk>` for log chunks, `t<position>` for accumulator
//! entries, `p<key>` for the accumulator's prefix cache, `i<hex label>` for
//! VRF indices, `v<hex label>:<hex version>` for version records, plus the
//! `tree-head` and `auditor-tree-head` singletons.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use keytrans_transparency::store::{LogStore, SearchStore};

mod memory;

pub use memory::MemoryBackend;

const TREE_HEAD_KEY: &str = "tree-head";
const AUDITOR_TREE_HEAD_KEY: &str = "auditor-tree-head";

fn chunk_key(id: u64) -> String {
    format!("l{id}")
}

fn entry_key(position: u64) -> String {
    format!("t{position}")
}

fn prefix_key(key: &str) -> String {
    format!("p{key}")
}

fn index_key(label: &[u8]) -> String {
    format!("i{}", hex::encode(label))
}

fn version_key(label: &[u8], version: u32) -> String {
    format!("v{}:{:08x}", hex::encode(label), version)
}

/// The key-value backend contract. Implementations handle their own
/// synchronization; errors are propagated to callers untouched.
pub trait Backend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn batch_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Applies every write in `entries` atomically. `None` deletes the key.
    fn batch_put(&self, entries: &[(String, Option<Vec<u8>>)]) -> Result<()>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

impl<B: Backend> Backend for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn batch_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        (**self).batch_get(keys)
    }

    fn batch_put(&self, entries: &[(String, Option<Vec<u8>>)]) -> Result<()> {
        (**self).batch_put(entries)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }
}

/// The storage facade for one directory.
///
/// A writable store owns its write buffer exclusively; read-only clones
/// share the backend but never the buffer, and writing through one is an
/// invariant violation that aborts.
pub struct TransparencyStore<B> {
    backend: Arc<B>,
    buffer: BTreeMap<String, Option<Vec<u8>>>,
    read_only: bool,
}

impl<B: Backend> TransparencyStore<B> {
    pub fn new(backend: B) -> Self {
        TransparencyStore {
            backend: Arc::new(backend),
            buffer: BTreeMap::new(),
            read_only: false,
        }
    }

    /// A read-only view sharing the backend. It sees committed state only.
    pub fn clone_read_only(&self) -> Self {
        TransparencyStore {
            backend: Arc::clone(&self.backend),
            buffer: BTreeMap::new(),
            read_only: true,
        }
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(buffered) = self.buffer.get(key) {
            return Ok(buffered.clone());
        }
        self.backend.get(key)
    }

    fn read_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out: Vec<Option<Vec<u8>>> = vec![None; keys.len()];
        let mut missing = Vec::new();
        let mut missing_keys = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match self.buffer.get(key) {
                Some(buffered) => out[i] = buffered.clone(),
                None => {
                    missing.push(i);
                    missing_keys.push(key.clone());
                }
            }
        }
        if !missing_keys.is_empty() {
            let fetched = self.backend.batch_get(&missing_keys)?;
            for (i, value) in missing.into_iter().zip(fetched) {
                out[i] = value;
            }
        }
        Ok(out)
    }

    fn write(&mut self, key: String, value: Option<Vec<u8>>) {
        assert!(!self.read_only, "write through a read-only store handle");
        self.buffer.insert(key, value);
    }

    /// The committed tree head and auditor tree head, if any.
    pub fn tree_head(&self) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
        Ok((
            self.read(TREE_HEAD_KEY)?,
            self.read(AUDITOR_TREE_HEAD_KEY)?,
        ))
    }

    pub fn put_tree_head(&mut self, head: Vec<u8>) {
        self.write(TREE_HEAD_KEY.to_owned(), Some(head));
    }

    pub fn put_auditor_tree_head(&mut self, head: Vec<u8>) {
        self.write(AUDITOR_TREE_HEAD_KEY.to_owned(), Some(head));
    }

    pub fn batch_get_index(&self, labels: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        let keys: Vec<String> = labels.iter().map(|label| index_key(label)).collect();
        self.read_many(&keys)
    }

    pub fn put_index(&mut self, label: &[u8], index: &[u8; 32]) {
        self.write(index_key(label), Some(index.to_vec()));
    }

    pub fn delete_index(&mut self, label: &[u8]) {
        self.write(index_key(label), None);
    }

    pub fn get_version(&self, label: &[u8], version: u32) -> Result<Option<Vec<u8>>> {
        self.read(&version_key(label, version))
    }

    pub fn put_version(&mut self, label: &[u8], version: u32, record: &[u8]) {
        self.write(version_key(label, version), Some(record.to_vec()));
    }

    pub fn delete_version(&mut self, label: &[u8], version: u32) {
        self.write(version_key(label, version), None);
    }

    /// Raw accumulator entries by log position.
    pub fn batch_get(&self, positions: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        let keys: Vec<String> = positions.iter().map(|p| entry_key(*p)).collect();
        let values = self.read_many(&keys)?;
        Ok(positions
            .iter()
            .zip(values)
            .filter_map(|(p, value)| value.map(|v| (*p, v)))
            .collect())
    }

    pub fn put(&mut self, position: u64, data: &[u8]) {
        self.write(entry_key(position), Some(data.to_vec()));
    }

    pub fn delete(&mut self, position: u64) {
        self.write(entry_key(position), None);
    }

    /// The chunk keyspace as a [`LogStore`] view.
    pub fn log_store(&mut self) -> LogStoreFacet<'_, B> {
        LogStoreFacet { store: self }
    }

    /// The prefix-cache keyspace as a string-keyed view.
    pub fn prefix_store(&mut self) -> PrefixStoreFacet<'_, B> {
        PrefixStoreFacet { store: self }
    }

    /// Flushes the buffer: one atomic batch for everything except the tree
    /// head, then the head alone, only if the batch succeeded. On error the
    /// buffer is left intact.
    pub fn commit(&mut self) -> Result<()> {
        assert!(!self.read_only, "commit through a read-only store handle");

        let batch: Vec<(String, Option<Vec<u8>>)> = self
            .buffer
            .iter()
            .filter(|(key, _)| key.as_str() != TREE_HEAD_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !batch.is_empty() {
            self.backend.batch_put(&batch)?;
        }
        if let Some(Some(head)) = self.buffer.get(TREE_HEAD_KEY) {
            self.backend.put(TREE_HEAD_KEY, head)?;
        }
        self.buffer.clear();
        Ok(())
    }
}

impl<B: Backend> LogStore for TransparencyStore<B> {
    fn batch_get_chunks(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        let keys: Vec<String> = ids.iter().map(|id| chunk_key(*id)).collect();
        let values = self.read_many(&keys)?;
        Ok(ids
            .iter()
            .zip(values)
            .filter_map(|(id, value)| value.map(|v| (*id, v)))
            .collect())
    }

    fn put_chunk(&mut self, id: u64, data: Vec<u8>) -> Result<()> {
        self.write(chunk_key(id), Some(data));
        Ok(())
    }
}

impl<B: Backend> SearchStore for TransparencyStore<B> {
    fn batch_get_entries(&self, positions: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        self.batch_get(positions)
    }

    fn put_entry(&mut self, position: u64, data: Vec<u8>) -> Result<()> {
        self.put(position, &data);
        Ok(())
    }

    fn cache_lookup(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read(&prefix_key(key))
    }

    fn cache_store(&mut self, key: &str, data: Vec<u8>) -> Result<()> {
        self.write(prefix_key(key), Some(data));
        Ok(())
    }
}

/// Narrow view over the chunk keyspace.
pub struct LogStoreFacet<'a, B> {
    store: &'a mut TransparencyStore<B>,
}

impl<B: Backend> LogStore for LogStoreFacet<'_, B> {
    fn batch_get_chunks(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        self.store.batch_get_chunks(ids)
    }

    fn put_chunk(&mut self, id: u64, data: Vec<u8>) -> Result<()> {
        self.store.put_chunk(id, data)
    }
}

/// Narrow view over the prefix-cache keyspace.
pub struct PrefixStoreFacet<'a, B> {
    store: &'a mut TransparencyStore<B>,
}

impl<B: Backend> PrefixStoreFacet<'_, B> {
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.read(&prefix_key(key))
    }

    pub fn put(&mut self, key: &str, data: Vec<u8>) {
        self.store.write(prefix_key(key), Some(data));
    }

    pub fn delete(&mut self, key: &str) {
        self.store.write(prefix_key(key), None);
    }
}
