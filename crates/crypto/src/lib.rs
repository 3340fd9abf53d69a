//! Cryptographic primitives for the keytrans directory: the SHA-256 hash
//! newtype shared by every tree structure, the P-256 verifiable random
//! function that maps user labels to tree coordinates, and the signing
//! keypairs consumed by the head-signing layer.

#![warn(rust_2018_idioms, unused_lifetimes, unused_qualifications)]
#![forbid(unsafe_code)]

pub mod hash;
pub mod signing;
pub mod vrf;
