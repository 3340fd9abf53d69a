//! Verifiable data structures for the keytrans directory.
//!
//! The [`log`] module implements the append-only Merkle log the directory
//! commits to: in-order tree arithmetic, the chunked node store, the proof
//! engine, and the stateless verifier. The [`search`] module layers the
//! accumulator on top of it: a binary search tree over 32-byte keys whose
//! nodes are log entries, producing combined inclusion/exclusion proofs.
//! Storage is abstracted behind the traits in [`store`].

#![warn(rust_2018_idioms, unused_lifetimes, unused_qualifications)]
#![forbid(unsafe_code)]

pub mod log;
pub mod search;
pub mod store;
