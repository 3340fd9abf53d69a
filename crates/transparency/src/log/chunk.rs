//! Chunked persistence for log nodes.
//!
//! A chunk is a 4-level subtree: 8 stripe slots and 7 internal slots,
//! addressed by the in-order index of its root. On disk a chunk is the
//! concatenation of its populated stripes, 32 bytes each, with no gaps.
//! Stratum-0 stripes hold raw leaf values; stripes of higher strata hold
//! the node hashes of completed subtrees four levels down. Internal slots
//! are never stored; they are recomputed from the stripes below them and
//! cached for the lifetime of the owning [`ChunkSet`].

use keytrans_crypto::hash::{Hash, HASH_SIZE};
use std::collections::HashMap;

use super::math;
use super::{hash_branch, hash_leaf, LogError};

const SLOT_COUNT: usize = 15;
const STRIPE_COUNT: usize = 8;

/// One chunk of the log, identified by its root's in-order index.
pub(crate) struct Chunk {
    id: u64,
    stripes: Vec<[u8; HASH_SIZE]>,
    cached: [Option<Hash>; SLOT_COUNT],
    dirty: bool,
}

impl Chunk {
    fn new(id: u64) -> Self {
        debug_assert_eq!(math::level(id) % 4, 3, "chunk ids sit at the top of a stratum");
        Chunk {
            id,
            stripes: Vec::new(),
            cached: Default::default(),
            dirty: false,
        }
    }

    fn parse(id: u64, data: &[u8]) -> Result<Self, LogError> {
        if data.is_empty() {
            return Err(LogError::MalformedChunk {
                id,
                reason: "chunk is empty",
            });
        }
        if data.len() % HASH_SIZE != 0 {
            return Err(LogError::MalformedChunk {
                id,
                reason: "length is not a whole number of stripes",
            });
        }
        let count = data.len() / HASH_SIZE;
        if count > STRIPE_COUNT {
            return Err(LogError::MalformedChunk {
                id,
                reason: "more stripes than a chunk holds",
            });
        }
        let mut chunk = Chunk::new(id);
        for stripe in data.chunks_exact(HASH_SIZE) {
            let mut bytes = [0u8; HASH_SIZE];
            bytes.copy_from_slice(stripe);
            chunk.stripes.push(bytes);
        }
        Ok(chunk)
    }

    fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.stripes.len() * HASH_SIZE);
        for stripe in &self.stripes {
            out.extend_from_slice(stripe);
        }
        out
    }

    fn stripe(&self, slot: usize) -> Option<&[u8; HASH_SIZE]> {
        debug_assert_eq!(slot % 2, 0);
        self.stripes.get(slot / 2)
    }

    fn set_stripe(&mut self, slot: usize, value: [u8; HASH_SIZE]) {
        debug_assert_eq!(slot % 2, 0);
        let position = slot / 2;
        match position.cmp(&self.stripes.len()) {
            std::cmp::Ordering::Less => {
                panic!("stripe {position} of chunk {} written twice", self.id)
            }
            std::cmp::Ordering::Equal => self.stripes.push(value),
            std::cmp::Ordering::Greater => {
                panic!("writing stripe {position} of chunk {} would leave a gap", self.id)
            }
        }
        self.dirty = true;
        self.cached = Default::default();
    }
}

/// Every chunk touched by one operation. Lookups go through the set, never
/// across chunks directly, so the recursion over truncated subtrees cannot
/// cycle.
pub(crate) struct ChunkSet {
    chunks: HashMap<u64, Chunk>,
}

impl ChunkSet {
    pub(crate) fn new() -> Self {
        ChunkSet {
            chunks: HashMap::new(),
        }
    }

    /// Parses and adds a chunk loaded from storage.
    pub(crate) fn insert(&mut self, id: u64, data: &[u8]) -> Result<(), LogError> {
        let chunk = Chunk::parse(id, data)?;
        self.chunks.insert(id, chunk);
        Ok(())
    }

    /// Adds a brand-new empty chunk.
    pub(crate) fn create(&mut self, id: u64) {
        self.chunks.insert(id, Chunk::new(id));
    }

    /// The hash of node `x` in a tree of `n` leaves.
    ///
    /// Panics if a chunk or stripe the node depends on is absent from the
    /// set: callers are responsible for loading everything an operation
    /// touches up front.
    pub(crate) fn get(&mut self, x: u64, n: u64) -> Hash {
        if !math::is_full_subtree(x, n) {
            let left = self.get(math::left(x), n);
            let right = self.get(math::right(x, n), n);
            return hash_branch(&left, &right);
        }

        let id = math::chunk_id(x);
        let slot = math::chunk_slot(x);

        if math::is_stripe(x) {
            let chunk = self
                .chunks
                .get(&id)
                .unwrap_or_else(|| panic!("chunk {id} not loaded"));
            let stripe = chunk
                .stripe(slot)
                .unwrap_or_else(|| panic!("node {x} missing from chunk {id}"));
            if math::level(x) == 0 {
                hash_leaf(stripe)
            } else {
                Hash::from(*stripe)
            }
        } else {
            let cached = self.chunks.get(&id).and_then(|chunk| chunk.cached[slot]);
            if let Some(hash) = cached {
                return hash;
            }
            // Children of an internal slot live in the same chunk.
            let left = self.get(math::left(x), n);
            let right = self.get(math::right(x, n), n);
            let hash = hash_branch(&left, &right);
            let chunk = self
                .chunks
                .get_mut(&id)
                .unwrap_or_else(|| panic!("chunk {id} not loaded"));
            chunk.cached[slot] = Some(hash);
            hash
        }
    }

    /// Writes the stripe for node `x`. The chunk must already be in the set.
    pub(crate) fn write(&mut self, x: u64, value: [u8; HASH_SIZE]) {
        let id = math::chunk_id(x);
        let slot = math::chunk_slot(x);
        let chunk = self
            .chunks
            .get_mut(&id)
            .unwrap_or_else(|| panic!("chunk {id} not loaded"));
        chunk.set_stripe(slot, value);
    }

    /// Serializes the chunks modified by this operation, ordered by id.
    pub(crate) fn marshal(&self) -> Vec<(u64, Vec<u8>)> {
        let mut out: Vec<(u64, Vec<u8>)> = self
            .chunks
            .values()
            .filter(|chunk| chunk.dirty)
            .map(|chunk| (chunk.id, chunk.marshal()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}
