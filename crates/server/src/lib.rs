//! Server-side composition of the keytrans core: the buffered storage
//! facade over a key-value backend, and the directory service that drives
//! the VRF, accumulator, and version records through it.

#![warn(rust_2018_idioms, unused_lifetimes, unused_qualifications)]
#![forbid(unsafe_code)]

pub mod directory;
pub mod store;

pub use directory::{Directory, DirectoryError, SearchOutput, TreeHead};
pub use store::{Backend, MemoryBackend, TransparencyStore};
