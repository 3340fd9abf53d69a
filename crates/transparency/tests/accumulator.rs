//! End-to-end scenario for the accumulator: a few thousand keys inserted,
//! then inclusion, exclusion, and historical proofs checked against the
//! roots the log reported along the way.

use anyhow::Result;
use keytrans_crypto::hash::Hash;
use keytrans_transparency::log::{verify_inclusion, LogTree};
use keytrans_transparency::search::{verify_search, Accumulator, SearchError, SearchKey};
use keytrans_transparency::store::{LogStore, SearchStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct MemorySearchStore {
    chunks: HashMap<u64, Vec<u8>>,
    entries: HashMap<u64, Vec<u8>>,
    cache: HashMap<String, Vec<u8>>,
}

impl LogStore for MemorySearchStore {
    fn batch_get_chunks(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.chunks.get(id).map(|data| (*id, data.clone())))
            .collect())
    }

    fn put_chunk(&mut self, id: u64, data: Vec<u8>) -> Result<()> {
        self.chunks.insert(id, data);
        Ok(())
    }
}

impl SearchStore for MemorySearchStore {
    fn batch_get_entries(&self, positions: &[u64]) -> Result<HashMap<u64, Vec<u8>>> {
        Ok(positions
            .iter()
            .filter_map(|p| self.entries.get(p).map(|data| (*p, data.clone())))
            .collect())
    }

    fn put_entry(&mut self, position: u64, data: Vec<u8>) -> Result<()> {
        self.entries.insert(position, data);
        Ok(())
    }

    fn cache_lookup(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).cloned())
    }

    fn cache_store(&mut self, key: &str, data: Vec<u8>) -> Result<()> {
        self.cache.insert(key.to_owned(), data);
        Ok(())
    }
}

const KEY_COUNT: usize = 2000;

struct Scenario {
    store: MemorySearchStore,
    /// Key -> log position, mirroring the accumulator's contents.
    mirror: BTreeMap<SearchKey, u64>,
    /// Keys in insertion order; position i holds the log's leaf i value.
    by_position: Vec<SearchKey>,
    /// Root reported after each append; index i is the root at size i + 1.
    roots: Vec<Hash>,
}

fn build_scenario(seed: u64) -> Scenario {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = MemorySearchStore::default();
    let mut mirror = BTreeMap::new();
    let mut by_position = Vec::new();
    let mut roots = Vec::new();

    let mut accumulator = Accumulator::new(&mut store, 0);
    while by_position.len() < KEY_COUNT {
        let key: SearchKey = rng.gen();
        if mirror.contains_key(&key) {
            continue;
        }
        let (position, root) = accumulator.insert(&key).expect("insert");
        assert_eq!(position, by_position.len() as u64);
        mirror.insert(key, position);
        by_position.push(key);
        roots.push(root);
    }
    drop(accumulator);

    Scenario {
        store,
        mirror,
        by_position,
        roots,
    }
}

#[test]
fn test_every_inserted_key_is_found() {
    let mut scenario = build_scenario(11);
    let n = KEY_COUNT as u64;
    let root = scenario.roots[KEY_COUNT - 1];
    let mut accumulator = Accumulator::new(&mut scenario.store, n);

    for (key, position) in &scenario.mirror {
        let result = accumulator.search(key).expect("search");
        assert!(result.inclusion, "key at position {position} not found");

        let verified = verify_search(key, n, &root, &result).expect("verify");
        assert!(verified.inclusion);
        assert_eq!(verified.position, Some(*position));
    }
}

#[test]
fn test_absent_keys_produce_bracketed_exclusions() {
    let mut scenario = build_scenario(12);
    let n = KEY_COUNT as u64;
    let root = scenario.roots[KEY_COUNT - 1];
    let mut rng = StdRng::seed_from_u64(13);

    for _ in 0..KEY_COUNT {
        let key: SearchKey = rng.gen();
        if scenario.mirror.contains_key(&key) {
            continue;
        }

        let mut accumulator = Accumulator::new(&mut scenario.store, n);
        let result = accumulator.search(&key).expect("search");
        assert!(!result.inclusion);

        let verified = verify_search(&key, n, &root, &result).expect("verify");
        assert!(!verified.inclusion);

        // The exclusion path brackets the key with its true neighbors.
        let predecessor = scenario.mirror.range(..key).next_back().map(|(k, _)| *k);
        let successor = scenario
            .mirror
            .range(key..)
            .next()
            .map(|(k, _)| *k);
        assert_eq!(verified.lower, predecessor);
        assert_eq!(verified.upper, successor);
        if let (Some(low), Some(high)) = (verified.lower, verified.upper) {
            assert!(low < key && key < high);
        }
    }
}

#[test]
fn test_historical_inclusion_proofs_verify() {
    let mut scenario = build_scenario(14);
    let log = LogTree::new(&mut scenario.store);
    let mut rng = StdRng::seed_from_u64(15);

    for _ in 0..5 * KEY_COUNT {
        let m = rng.gen_range(1..=KEY_COUNT as u64);
        let x = rng.gen_range(0..m);
        let proof = log.get_batch(&[x], m).expect("proof");
        verify_inclusion(
            x,
            m,
            &scenario.by_position[x as usize],
            &proof,
            &scenario.roots[m as usize - 1],
        )
        .unwrap_or_else(|e| panic!("leaf {x} at size {m}: {e}"));
    }
}

#[test]
fn test_duplicate_insert_is_a_no_op() {
    let mut scenario = build_scenario(16);
    let n = KEY_COUNT as u64;
    let mut accumulator = Accumulator::new(&mut scenario.store, n);

    let key = scenario.by_position[17];
    let (position, root) = accumulator.insert(&key).expect("insert");
    assert_eq!(position, 17);
    assert_eq!(accumulator.len(), n);
    assert_eq!(root, scenario.roots[KEY_COUNT - 1]);
}

#[test]
fn test_tampered_search_results_are_rejected() {
    let mut scenario = build_scenario(17);
    let n = KEY_COUNT as u64;
    let root = scenario.roots[KEY_COUNT - 1];
    let mut accumulator = Accumulator::new(&mut scenario.store, n);

    let key = scenario.by_position[42];
    let result = accumulator.search(&key).expect("search");
    verify_search(&key, n, &root, &result).expect("untampered");

    // A flipped byte in a visited entry breaks the log anchoring.
    let mut tampered = result.clone();
    tampered.search_path[0][0] ^= 0x01;
    assert!(verify_search(&key, n, &root, &tampered).is_err());

    // A flipped proof hash breaks the recomputed root.
    let mut tampered = result.clone();
    let mut bytes = *tampered.proof[0].bytes();
    bytes[0] ^= 0x01;
    tampered.proof[0] = bytes.into();
    assert!(verify_search(&key, n, &root, &tampered).is_err());

    // A lying inclusion flag disagrees with the path's terminal state.
    let mut tampered = result.clone();
    tampered.inclusion = false;
    assert!(matches!(
        verify_search(&key, n, &root, &tampered),
        Err(SearchError::WrongTermination),
    ));

    // A stale root is not reproduced.
    assert!(verify_search(&key, n, &scenario.roots[KEY_COUNT - 2], &result).is_err());
}

#[test]
fn test_consistency_between_accumulator_sizes() {
    let mut scenario = build_scenario(18);
    let n = KEY_COUNT as u64;
    let mut rng = StdRng::seed_from_u64(19);
    let mut accumulator = Accumulator::new(&mut scenario.store, n);

    for _ in 0..64 {
        let m = rng.gen_range(1..n);
        let proof = accumulator.get_consistency_proof(m).expect("proof");
        assert!(!proof.is_empty());
    }
}

#[test]
fn test_searching_an_empty_accumulator_is_an_error() {
    let mut store = MemorySearchStore::default();
    let mut accumulator = Accumulator::new(&mut store, 0);
    assert!(accumulator.search(&[0u8; 32]).is_err());
}
