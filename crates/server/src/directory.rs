//! The directory service: the single-writer pipeline that maps labels
//! through the VRF, inserts their indices into the accumulator, appends
//! version records, and publishes tree heads through the store's ordered
//! commit.

use keytrans_crypto::hash::{Hash, HASH_SIZE};
use keytrans_crypto::vrf::{VrfError, VrfPrivateKey, VrfPublicKey};
use keytrans_transparency::log::LogError;
use keytrans_transparency::search::{
    verify_search, Accumulator, SearchError, SearchResult, VerifiedSearch,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Backend, TransparencyStore};

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("version {0} is not the next version for this label")]
    NonMonotonicVersion(u32),

    #[error("malformed tree head")]
    MalformedHead,

    #[error(transparent)]
    Vrf(#[from] VrfError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The size and root a tree head commits to.
///
/// This is the unsigned encoding, `uvarint(size) || root`; signatures are
/// applied by the layer above and the store treats the bytes as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHead {
    pub size: u64,
    pub root: Hash,
}

impl TreeHead {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + HASH_SIZE);
        leb128::write::unsigned(&mut out, self.size).unwrap();
        out.extend_from_slice(self.root.bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, DirectoryError> {
        let mut rest = data;
        let size =
            leb128::read::unsigned(&mut rest).map_err(|_| DirectoryError::MalformedHead)?;
        if rest.len() != HASH_SIZE {
            return Err(DirectoryError::MalformedHead);
        }
        let root = Hash::try_from(rest).map_err(|_| DirectoryError::MalformedHead)?;
        Ok(TreeHead { size, root })
    }
}

/// Everything a client needs to check one answer: the VRF mapping of the
/// label, the accumulator search, and the requested version record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    pub index: [u8; 32],
    pub vrf_proof: Vec<u8>,
    pub search: SearchResult,
    pub record: Option<Vec<u8>>,
}

impl SearchOutput {
    /// Verifies the VRF mapping of `label` and the search result against a
    /// trusted `head`.
    pub fn verify(
        &self,
        public_key: &VrfPublicKey,
        label: &[u8],
        head: &TreeHead,
    ) -> Result<VerifiedSearch, DirectoryError> {
        let index = public_key.verify(label, &self.vrf_proof)?;
        if index != self.index {
            return Err(DirectoryError::Vrf(VrfError::VerificationFailed));
        }
        Ok(verify_search(&self.index, head.size, &head.root, &self.search)?)
    }
}

/// The single-writer directory over one store.
pub struct Directory<B> {
    store: TransparencyStore<B>,
    vrf_key: VrfPrivateKey,
    size: u64,
    root: Option<Hash>,
}

impl<B: Backend> Directory<B> {
    /// Opens the directory, resuming from the committed tree head if one
    /// exists.
    pub fn open(backend: B, vrf_key: VrfPrivateKey) -> Result<Self, DirectoryError> {
        let store = TransparencyStore::new(backend);
        let (head, _) = store.tree_head()?;
        let head = head.as_deref().map(TreeHead::decode).transpose()?;
        Ok(Directory {
            store,
            vrf_key,
            size: head.map(|h| h.size).unwrap_or(0),
            root: head.map(|h| h.root),
        })
    }

    pub fn vrf_public_key(&self) -> VrfPublicKey {
        self.vrf_key.public_key()
    }

    /// The number of accumulator entries, including staged ones.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Stages an update: derives the label's index, records it on first
    /// sight, inserts it into the accumulator, and appends the version
    /// record. Versions are monotone per label; `version` must be 0 or
    /// follow an existing `version - 1`, and may not rewrite an existing
    /// record.
    pub fn update(
        &mut self,
        label: &[u8],
        version: u32,
        record: &[u8],
    ) -> Result<(), DirectoryError> {
        if self.store.get_version(label, version)?.is_some() {
            return Err(DirectoryError::NonMonotonicVersion(version));
        }
        if version > 0 && self.store.get_version(label, version - 1)?.is_none() {
            return Err(DirectoryError::NonMonotonicVersion(version));
        }

        let (index, _) = self.vrf_key.prove(label);
        if self.store.batch_get_index(&[label])?[0].is_none() {
            self.store.put_index(label, &index);
        }
        self.store.put_version(label, version, record);

        let mut accumulator = Accumulator::new(&mut self.store, self.size);
        let (position, root) = accumulator.insert(&index)?;
        self.size = accumulator.len();
        self.root = Some(root);

        tracing::debug!(
            size = self.size,
            position,
            version,
            "staged directory update"
        );
        Ok(())
    }

    /// Answers a query for `label` at `version` against the staged state.
    pub fn search(
        &mut self,
        label: &[u8],
        version: u32,
    ) -> Result<SearchOutput, DirectoryError> {
        let (index, vrf_proof) = self.vrf_key.prove(label);
        let mut accumulator = Accumulator::new(&mut self.store, self.size);
        let search = accumulator.search(&index)?;
        let record = self.store.get_version(label, version)?;
        Ok(SearchOutput {
            index,
            vrf_proof: vrf_proof.to_vec(),
            search,
            record,
        })
    }

    /// Publishes the staged state: stages the new head and flushes the
    /// buffer, with the head written strictly after everything else.
    pub fn commit(&mut self) -> Result<Option<TreeHead>, DirectoryError> {
        let head = match self.root {
            Some(root) => TreeHead {
                size: self.size,
                root,
            },
            None => {
                self.store.commit()?;
                return Ok(None);
            }
        };
        self.store.put_tree_head(head.encode());
        self.store.commit()?;
        tracing::info!(size = head.size, root = %head.root, "committed tree head");
        Ok(Some(head))
    }
}
