//! Stateless re-evaluation of log proofs.

use keytrans_crypto::hash::Hash;
use std::collections::HashMap;

use super::{hash_branch, hash_leaf, math, LeafValue, LogError};

/// Evaluates proofs against claimed leaf values, carrying the frontier of
/// the last accepted size forward.
///
/// A verifier that has accepted size `p` retains the hashes of the full
/// subtrees composing size `p`: enough to extend to any larger size given
/// a consistency proof, and enough to recompute the old root if a caller
/// wants to compare it against a stored head.
#[derive(Debug, Clone, Default)]
pub struct LogVerifier {
    prev: u64,
    frontier: Vec<Hash>,
}

impl LogVerifier {
    /// A verifier that has observed nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier resuming from a retained frontier for size `prev`.
    pub fn with_state(prev: u64, frontier: Vec<Hash>) -> Result<Self, LogError> {
        if prev == 0 || prev > math::MAX_TREE_SIZE {
            return Err(LogError::SizeOutOfRange(prev));
        }
        if frontier.len() != prev.count_ones() as usize {
            return Err(LogError::ValueCountMismatch {
                expected: prev.count_ones() as usize,
                actual: frontier.len(),
            });
        }
        Ok(LogVerifier { prev, frontier })
    }

    /// The last accepted size.
    pub fn size(&self) -> u64 {
        self.prev
    }

    /// The retained frontier hashes, leftmost subtree first.
    pub fn frontier(&self) -> &[Hash] {
        &self.frontier
    }

    /// The root of the last accepted size, folded from the frontier.
    pub fn root(&self) -> Option<Hash> {
        fold_frontier(&self.frontier)
    }

    /// Recomputes the root at size `n` from claimed leaf values, the
    /// retained frontier, and `proof`, then advances the retained state.
    ///
    /// `entries` are leaf ordinals and `values` their claimed raw values;
    /// `proof` must contain exactly the copath hashes for this query, in
    /// [`math::batch_copath`] order. Wherever a retained hash is also
    /// recomputable from the claims, the two must agree.
    pub fn evaluate(
        &mut self,
        entries: &[u64],
        values: &[LeafValue],
        n: u64,
        proof: &[Hash],
    ) -> Result<Hash, LogError> {
        if n == 0 || n > math::MAX_TREE_SIZE {
            return Err(LogError::SizeOutOfRange(n));
        }
        if self.prev > n {
            return Err(LogError::InvalidRange {
                old: self.prev,
                new: n,
            });
        }
        if entries.len() != values.len() {
            return Err(LogError::ValueCountMismatch {
                expected: entries.len(),
                actual: values.len(),
            });
        }

        let mut claimed: HashMap<u64, LeafValue> = HashMap::with_capacity(entries.len());
        for (&entry, value) in entries.iter().zip(values) {
            if entry >= n {
                return Err(LogError::LeafOutOfRange {
                    index: entry,
                    size: n,
                });
            }
            if let Some(previous) = claimed.insert(2 * entry, *value) {
                if previous != *value {
                    return Err(LogError::ConflictingValues(entry));
                }
            }
        }
        let mut claimed_leaves: Vec<u64> = claimed.keys().copied().collect();
        claimed_leaves.sort_unstable();

        let copath = math::batch_copath(entries, n, self.prev);
        if proof.len() != copath.len() {
            return Err(LogError::ProofLengthMismatch {
                expected: copath.len(),
                actual: proof.len(),
            });
        }

        let walk = Walk {
            claimed: &claimed,
            claimed_leaves: &claimed_leaves,
            retained: if self.prev > 0 {
                math::full_subtrees(math::root(self.prev), self.prev)
                    .into_iter()
                    .zip(self.frontier.iter().copied())
                    .collect()
            } else {
                HashMap::new()
            },
            copath: copath.iter().copied().zip(proof.iter().copied()).collect(),
        };

        let mut memo = HashMap::new();
        let root = walk.compute(math::root(n), n, &mut memo)?;
        let frontier = math::full_subtrees(math::root(n), n)
            .into_iter()
            .map(|x| walk.compute(x, n, &mut memo))
            .collect::<Result<Vec<_>, _>>()?;

        self.prev = n;
        self.frontier = frontier;
        Ok(root)
    }
}

struct Walk<'a> {
    claimed: &'a HashMap<u64, LeafValue>,
    claimed_leaves: &'a [u64],
    retained: HashMap<u64, Hash>,
    copath: HashMap<u64, Hash>,
}

impl Walk<'_> {
    fn compute(&self, x: u64, n: u64, memo: &mut HashMap<u64, Hash>) -> Result<Hash, LogError> {
        if let Some(&hash) = memo.get(&x) {
            return Ok(hash);
        }
        let hash = self.compute_uncached(x, n, memo)?;
        memo.insert(x, hash);
        Ok(hash)
    }

    fn compute_uncached(
        &self,
        x: u64,
        n: u64,
        memo: &mut HashMap<u64, Hash>,
    ) -> Result<Hash, LogError> {
        if let Some(&hash) = self.copath.get(&x) {
            return Ok(hash);
        }

        if let Some(&retained) = self.retained.get(&x) {
            // Recompute beneath a retained subtree only when a claim
            // reaches into it; the copath descends in exactly that case.
            if !self.reaches(x) {
                return Ok(retained);
            }
            let recomputed = self.recompute(x, n, memo)?;
            if recomputed != retained {
                return Err(LogError::HashMismatch(x));
            }
            return Ok(retained);
        }

        self.recompute(x, n, memo)
    }

    fn recompute(&self, x: u64, n: u64, memo: &mut HashMap<u64, Hash>) -> Result<Hash, LogError> {
        if math::is_leaf(x) {
            // Every leaf reached by the walk is claimed: unclaimed regions
            // terminate at a copath or retained ancestor above.
            let value = self
                .claimed
                .get(&x)
                .unwrap_or_else(|| unreachable!("leaf {x} unreachable without a claim"));
            return Ok(hash_leaf(value));
        }
        let left = self.compute(math::left(x), n, memo)?;
        let right = self.compute(math::right(x, n), n, memo)?;
        Ok(hash_branch(&left, &right))
    }

    fn reaches(&self, x: u64) -> bool {
        let (low, high) = math::subtree_range(x);
        let i = self.claimed_leaves.partition_point(|&leaf| leaf < low);
        i < self.claimed_leaves.len() && self.claimed_leaves[i] <= high
    }
}

fn fold_frontier(frontier: &[Hash]) -> Option<Hash> {
    frontier
        .iter()
        .rev()
        .copied()
        .reduce(|acc, hash| hash_branch(&hash, &acc))
}

/// Checks that leaf `entry` of a size-`n` tree has `value`, against a
/// trusted `root`.
pub fn verify_inclusion(
    entry: u64,
    n: u64,
    value: &LeafValue,
    proof: &[Hash],
    root: &Hash,
) -> Result<(), LogError> {
    let mut verifier = LogVerifier::new();
    let computed = verifier.evaluate(&[entry], &[*value], n, proof)?;
    if computed != *root {
        return Err(LogError::RootMismatch);
    }
    Ok(())
}

/// Checks that the retained frontier for size `m` extends to the trusted
/// `root` at size `n`.
pub fn verify_consistency(
    m: u64,
    n: u64,
    frontier: &[Hash],
    proof: &[Hash],
    root: &Hash,
) -> Result<(), LogError> {
    if m >= n {
        return Err(LogError::InvalidRange { old: m, new: n });
    }
    let mut verifier = LogVerifier::with_state(m, frontier.to_vec())?;
    let computed = verifier.evaluate(&[], &[], n, proof)?;
    if computed != *root {
        return Err(LogError::RootMismatch);
    }
    Ok(())
}
