//! The accumulator: a binary search tree over 32-byte keys whose nodes are
//! entries of the log tree.
//!
//! Entry 0 is the root of the search tree and every entry's 32-byte key is
//! committed to the log as its leaf value, so a search path can be
//! re-anchored in any tree head. The left/right child pointers are
//! navigational state kept alongside the committed log in the entry
//! keyspace; verification never trusts them beyond using them to walk, and
//! enforces the search-order invariant at every step.

use keytrans_crypto::hash::{Hash, HASH_SIZE};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::log::{math, LogError, LogTree, LogVerifier};
use crate::store::SearchStore;

mod leaf;

pub use leaf::Leaf;

/// A 32-byte search key (in the directory, a VRF output index).
pub type SearchKey = [u8; HASH_SIZE];

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("malformed search leaf: {0}")]
    MalformedLeaf(&'static str),

    #[error("entry {0} is missing from storage")]
    MissingEntry(u64),

    #[error("search path is not a valid descent for the key")]
    InvalidSearchPath,

    #[error("search result disagrees with its inclusion flag")]
    WrongTermination,

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The result of searching the accumulator for a key: the raw entries
/// visited from the root down, and a log proof anchoring them to the head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub inclusion: bool,
    pub search_path: Vec<Vec<u8>>,
    pub proof: Vec<Hash>,
}

/// The outcome of verifying a [`SearchResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSearch {
    pub inclusion: bool,
    /// Log position of the key, when included.
    pub position: Option<u64>,
    /// Largest key on the path below the queried key, when excluded.
    pub lower: Option<SearchKey>,
    /// Smallest key on the path above the queried key, when excluded.
    pub upper: Option<SearchKey>,
}

/// The accumulator over a [`SearchStore`].
pub struct Accumulator<S> {
    store: S,
    n: u64,
}

impl<S: SearchStore> Accumulator<S> {
    /// Opens the accumulator at its current size.
    pub fn new(store: S, n: u64) -> Self {
        Accumulator { store, n }
    }

    /// The number of entries.
    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Inserts `key`, returning its log position and the resulting root.
    /// Inserting a key already present changes nothing and returns its
    /// existing position.
    pub fn insert(&mut self, key: &SearchKey) -> Result<(u64, Hash), SearchError> {
        if let Some(cached) = self.store.cache_lookup(&hex::encode(key))? {
            let position = parse_position(&cached)?;
            let root = LogTree::new(&mut self.store).root(self.n)?;
            return Ok((position, root));
        }

        let mut parent = None;
        if self.n > 0 {
            let mut position = 0u64;
            loop {
                let (entry, _) = self.load_entry(position)?;
                let next = match key.cmp(&entry.value) {
                    Ordering::Equal => {
                        self.cache(key, position)?;
                        let root = LogTree::new(&mut self.store).root(self.n)?;
                        return Ok((position, root));
                    }
                    Ordering::Less => entry.left,
                    Ordering::Greater => entry.right,
                };
                if next == 0 || next >= self.n {
                    parent = Some((position, entry));
                    break;
                }
                if next <= position {
                    return Err(SearchError::MalformedLeaf("pointer does not descend"));
                }
                position = next;
            }
        }

        let position = self.n;
        let root = LogTree::new(&mut self.store).append(position, key)?;
        self.store.put_entry(
            position,
            Leaf {
                value: *key,
                left: 0,
                right: 0,
            }
            .marshal(),
        )?;

        if let Some((parent_position, mut entry)) = parent {
            if *key < entry.value {
                entry.left = position;
            } else {
                entry.right = position;
            }
            self.store.put_entry(parent_position, entry.marshal())?;
        }

        self.cache(key, position)?;
        self.n += 1;
        Ok((position, root))
    }

    /// Searches for `key`, producing an inclusion or exclusion result that
    /// verifies against the current head.
    pub fn search(&mut self, key: &SearchKey) -> Result<SearchResult, SearchError> {
        if self.n == 0 {
            return Err(SearchError::Log(LogError::SizeOutOfRange(0)));
        }

        let mut positions = Vec::new();
        let mut search_path = Vec::new();
        let mut inclusion = false;

        let mut position = 0u64;
        loop {
            let (entry, raw) = self.load_entry(position)?;
            positions.push(position);
            search_path.push(raw);

            let next = match key.cmp(&entry.value) {
                Ordering::Equal => {
                    inclusion = true;
                    break;
                }
                Ordering::Less => entry.left,
                Ordering::Greater => entry.right,
            };
            if next == 0 || next >= self.n {
                break;
            }
            if next <= position {
                return Err(SearchError::MalformedLeaf("pointer does not descend"));
            }
            position = next;
        }

        let proof = LogTree::new(&mut self.store).get_batch(&positions, self.n)?;
        Ok(SearchResult {
            inclusion,
            search_path,
            proof,
        })
    }

    /// The proof that the accumulator at size `m` extends to the current
    /// head.
    pub fn get_consistency_proof(&mut self, m: u64) -> Result<Vec<Hash>, SearchError> {
        Ok(LogTree::new(&mut self.store).get_consistency_proof(m, self.n)?)
    }

    /// The current root.
    pub fn root(&mut self) -> Result<Hash, SearchError> {
        Ok(LogTree::new(&mut self.store).root(self.n)?)
    }

    fn load_entry(&self, position: u64) -> Result<(Leaf, Vec<u8>), SearchError> {
        let mut got = self.store.batch_get_entries(&[position])?;
        let raw = got
            .remove(&position)
            .ok_or(SearchError::MissingEntry(position))?;
        let entry = Leaf::parse(&raw)?;
        Ok((entry, raw))
    }

    fn cache(&mut self, key: &SearchKey, position: u64) -> Result<(), SearchError> {
        let mut encoded = Vec::with_capacity(2);
        leb128::write::unsigned(&mut encoded, position).unwrap();
        self.store.cache_store(&hex::encode(key), encoded)?;
        Ok(())
    }
}

fn parse_position(data: &[u8]) -> Result<u64, SearchError> {
    let mut rest = data;
    let position = leb128::read::unsigned(&mut rest)
        .map_err(|_| SearchError::MalformedLeaf("bad cached position"))?;
    if !rest.is_empty() {
        return Err(SearchError::MalformedLeaf("bad cached position"));
    }
    Ok(position)
}

/// Re-walks a search result for `key` and anchors it in the trusted `root`
/// of a size-`n` head.
///
/// The walk re-derives the visited positions from the entries' own
/// pointers, requires every visited key to fall strictly between the bounds
/// established so far (the search-order invariant), requires positions to
/// increase (children are always appended after their parents), and checks
/// the terminal condition against the claimed inclusion flag. The visited
/// keys are then bound to the committed log via the batched proof.
pub fn verify_search(
    key: &SearchKey,
    n: u64,
    root: &Hash,
    result: &SearchResult,
) -> Result<VerifiedSearch, SearchError> {
    if n == 0 || n > math::MAX_TREE_SIZE {
        return Err(SearchError::Log(LogError::SizeOutOfRange(n)));
    }
    if result.search_path.is_empty() {
        return Err(SearchError::InvalidSearchPath);
    }

    let mut entries = Vec::with_capacity(result.search_path.len());
    let mut values = Vec::with_capacity(result.search_path.len());
    let mut lower: Option<SearchKey> = None;
    let mut upper: Option<SearchKey> = None;
    let mut found = None;
    let mut dead_end = false;

    let mut position = 0u64;
    let last = result.search_path.len() - 1;
    for (depth, raw) in result.search_path.iter().enumerate() {
        if position >= n {
            return Err(SearchError::InvalidSearchPath);
        }
        let entry = Leaf::parse(raw)?;
        if lower.is_some_and(|low| entry.value <= low) || upper.is_some_and(|up| entry.value >= up)
        {
            return Err(SearchError::InvalidSearchPath);
        }
        entries.push(position);
        values.push(entry.value);

        let next = match key.cmp(&entry.value) {
            Ordering::Equal => {
                if depth != last {
                    return Err(SearchError::InvalidSearchPath);
                }
                found = Some(position);
                break;
            }
            Ordering::Less => {
                upper = Some(entry.value);
                entry.left
            }
            Ordering::Greater => {
                lower = Some(entry.value);
                entry.right
            }
        };

        if next == 0 || next >= n {
            if depth != last {
                return Err(SearchError::InvalidSearchPath);
            }
            dead_end = true;
            break;
        }
        if next <= position {
            return Err(SearchError::InvalidSearchPath);
        }
        position = next;
    }

    // A path that stops while a child pointer is still live witnesses
    // neither inclusion nor exclusion.
    if found.is_none() && !dead_end {
        return Err(SearchError::InvalidSearchPath);
    }
    if result.inclusion != found.is_some() {
        return Err(SearchError::WrongTermination);
    }

    let mut verifier = LogVerifier::new();
    let computed = verifier.evaluate(&entries, &values, n, &result.proof)?;
    if computed != *root {
        return Err(SearchError::Log(LogError::RootMismatch));
    }

    Ok(VerifiedSearch {
        inclusion: result.inclusion,
        position: found,
        lower: if found.is_some() { None } else { lower },
        upper: if found.is_some() { None } else { upper },
    })
}
