//! The append-only Merkle log.
//!
//! Nodes are numbered in-order: for a tree of `n` leaves, leaf `i` sits at
//! index `2i` and internal nodes fill the odd indices between. The same
//! arithmetic ([`math`]) drives the storage engine ([`LogTree`]), the chunk
//! layout, and the verifier ([`LogVerifier`]), so proof ordering and length
//! checks agree on both sides by construction.

use keytrans_crypto::hash::{Digest, Hash, Sha256, HASH_SIZE};
use thiserror::Error;

mod chunk;
pub mod math;
mod tree;
mod verify;

pub use tree::LogTree;
pub use verify::{verify_consistency, verify_inclusion, LogVerifier};

/// The raw 32-byte value stored in a leaf.
pub type LeafValue = [u8; HASH_SIZE];

/// Hash of a leaf node, domain-separated from branches.
pub fn hash_leaf(value: &LeafValue) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(value);
    hasher.finalize().into()
}

/// Hash of an internal node from its two children.
pub fn hash_branch(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("tree size {0} is out of range")]
    SizeOutOfRange(u64),

    #[error("sizes {old} and {new} do not form a valid range")]
    InvalidRange { old: u64, new: u64 },

    #[error("leaf {index} is out of range for tree size {size}")]
    LeafOutOfRange { index: u64, size: u64 },

    #[error("got {actual} values for {expected} entries")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("got {actual} proof hashes, expected {expected}")]
    ProofLengthMismatch { expected: usize, actual: usize },

    #[error("conflicting values claimed for leaf {0}")]
    ConflictingValues(u64),

    #[error("recomputed hash for node {0} does not match its claimed value")]
    HashMismatch(u64),

    #[error("computed root does not match the trusted root")]
    RootMismatch,

    #[error("chunk {id} is malformed: {reason}")]
    MalformedChunk { id: u64, reason: &'static str },

    #[error("chunk {0} is missing from storage")]
    MissingChunk(u64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
