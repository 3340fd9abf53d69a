//! The append-only log engine.

use keytrans_crypto::hash::Hash;
use std::collections::BTreeSet;

use super::chunk::ChunkSet;
use super::{math, LeafValue, LogError};
use crate::store::LogStore;

/// The storage-backed log tree.
///
/// The engine is stateless apart from its store handle: the current size is
/// supplied by the caller, which lets the same store answer queries for any
/// historical size that has been persisted.
pub struct LogTree<S> {
    store: S,
}

impl<S: LogStore> LogTree<S> {
    pub fn new(store: S) -> Self {
        LogTree { store }
    }

    /// Appends leaf `i` (which must equal the current size) and returns the
    /// root of the tree at size `i + 1`.
    pub fn append(&mut self, i: u64, value: &LeafValue) -> Result<Hash, LogError> {
        if i >= math::MAX_TREE_SIZE {
            return Err(LogError::SizeOutOfRange(i));
        }
        let n = i + 1;
        let leaf = 2 * i;

        let mut wanted = BTreeSet::new();
        let mut created = BTreeSet::new();

        // The chunk holding the new leaf, created when the leaf begins one.
        if i % 8 == 0 {
            created.insert(math::chunk_id(leaf));
        } else {
            wanted.insert(math::chunk_id(leaf));
        }

        // Subtrees that complete with this leaf get their roots striped into
        // the stratum above. Completing level L means the leaf count is now
        // a multiple of 2^L.
        let mut completed = Vec::new();
        let mut target = 4u32;
        while target <= 62 && n % (1u64 << target) == 0 {
            let node = math::ancestor(leaf, target);
            completed.push(node);
            if math::chunk_slot(node) == 0 {
                created.insert(math::chunk_id(node));
            } else {
                wanted.insert(math::chunk_id(node));
            }
            // Computing the node's hash pulls on the chunks of its children.
            wanted.insert(math::chunk_id(math::left(node)));
            wanted.insert(math::chunk_id(math::right(node, n)));
            target += 4;
        }

        // Chunks needed to assemble the new root.
        chunks_for(math::root(n), n, &mut wanted);
        for id in &created {
            wanted.remove(id);
        }

        let mut set = self.load(&wanted)?;
        for &id in &created {
            set.create(id);
        }

        set.write(leaf, *value);
        for node in completed {
            let left = set.get(math::left(node), n);
            let right = set.get(math::right(node, n), n);
            set.write(node, super::hash_branch(&left, &right).into());
        }

        let root = set.get(math::root(n), n);
        for (id, data) in set.marshal() {
            self.store.put_chunk(id, data)?;
        }
        Ok(root)
    }

    /// The root of the tree at size `n`.
    pub fn root(&self, n: u64) -> Result<Hash, LogError> {
        check_size(n)?;
        let mut wanted = BTreeSet::new();
        chunks_for(math::root(n), n, &mut wanted);
        let mut set = self.load(&wanted)?;
        Ok(set.get(math::root(n), n))
    }

    /// The batched inclusion proof for `entries` (leaf ordinals) at size
    /// `n`: copath hashes in `batch_copath` order.
    pub fn get_batch(&self, entries: &[u64], n: u64) -> Result<Vec<Hash>, LogError> {
        check_size(n)?;
        for &entry in entries {
            if entry >= n {
                return Err(LogError::LeafOutOfRange {
                    index: entry,
                    size: n,
                });
            }
        }
        self.prove(&math::batch_copath(entries, n, 0), n)
    }

    /// Like [`get_batch`](Self::get_batch), but shaped for a verifier that
    /// retains the frontier of size `prev`: hashes the retained subtrees
    /// already pin down are left out.
    pub fn get_batch_since(
        &self,
        entries: &[u64],
        n: u64,
        prev: u64,
    ) -> Result<Vec<Hash>, LogError> {
        check_size(n)?;
        if prev > n {
            return Err(LogError::InvalidRange { old: prev, new: n });
        }
        for &entry in entries {
            if entry >= n {
                return Err(LogError::LeafOutOfRange {
                    index: entry,
                    size: n,
                });
            }
        }
        self.prove(&math::batch_copath(entries, n, prev), n)
    }

    /// The proof that the frontier at size `m` extends to the root at size
    /// `n`, for `0 < m < n`.
    pub fn get_consistency_proof(&self, m: u64, n: u64) -> Result<Vec<Hash>, LogError> {
        check_size(n)?;
        if m == 0 || m >= n {
            return Err(LogError::InvalidRange { old: m, new: n });
        }
        self.prove(&math::batch_copath(&[], n, m), n)
    }

    fn prove(&self, copath: &[u64], n: u64) -> Result<Vec<Hash>, LogError> {
        let mut wanted = BTreeSet::new();
        for &x in copath {
            chunks_for(x, n, &mut wanted);
        }
        let mut set = self.load(&wanted)?;
        Ok(copath.iter().map(|&x| set.get(x, n)).collect())
    }

    fn load(&self, ids: &BTreeSet<u64>) -> Result<ChunkSet, LogError> {
        let ids: Vec<u64> = ids.iter().copied().collect();
        let blobs = self.store.batch_get_chunks(&ids)?;
        let mut set = ChunkSet::new();
        for id in ids {
            let data = blobs.get(&id).ok_or(LogError::MissingChunk(id))?;
            set.insert(id, data)?;
        }
        Ok(set)
    }
}

fn check_size(n: u64) -> Result<(), LogError> {
    if n == 0 || n > math::MAX_TREE_SIZE {
        return Err(LogError::SizeOutOfRange(n));
    }
    Ok(())
}

/// Collects the chunks needed to compute the hash of node `x` at size `n`:
/// one chunk per full subtree, descending along the truncated right spine.
fn chunks_for(x: u64, n: u64, out: &mut BTreeSet<u64>) {
    if math::is_full_subtree(x, n) {
        out.insert(math::chunk_id(x));
        return;
    }
    chunks_for(math::left(x), n, out);
    chunks_for(math::right(x, n), n, out);
}
