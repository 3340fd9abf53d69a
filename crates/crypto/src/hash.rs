use serde::de::{Error as DeserializeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub use digest::Digest;
pub use sha2::Sha256;

/// Size in bytes of every digest, node value, and search key in the system.
pub const HASH_SIZE: usize = 32;

/// A SHA-256 output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Hashes `data` in a single pass.
    pub fn of(data: impl AsRef<[u8]>) -> Self {
        Hash(Sha256::digest(data).into())
    }

    pub fn bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }
}

impl From<digest::Output<Sha256>> for Hash {
    fn from(output: digest::Output<Sha256>) -> Self {
        Hash(output.into())
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("the provided slice was not {HASH_SIZE} bytes")]
pub struct IncorrectLengthError;

impl TryFrom<&[u8]> for Hash {
    type Error = IncorrectLengthError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; HASH_SIZE] = value.try_into().map_err(|_| IncorrectLengthError)?;
        Ok(Hash(bytes))
    }
}

impl TryFrom<Vec<u8>> for Hash {
    type Error = IncorrectLengthError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        value.as_slice().try_into()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HashVisitor;

        impl<'a> Visitor<'a> for HashVisitor {
            type Value = Hash;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{HASH_SIZE} bytes")
            }

            fn visit_bytes<E: DeserializeError>(self, v: &[u8]) -> Result<Self::Value, E> {
                v.try_into().map_err(|_| E::custom("invalid length"))
            }

            fn visit_byte_buf<E: DeserializeError>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                self.visit_bytes(&v)
            }

            fn visit_seq<A: serde::de::SeqAccess<'a>>(
                self,
                mut seq: A,
            ) -> Result<Self::Value, A::Error> {
                let mut bytes = [0u8; HASH_SIZE];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| A::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<u8>()?.is_some() {
                    return Err(A::Error::custom("invalid length"));
                }
                Ok(Hash(bytes))
            }
        }

        deserializer.deserialize_bytes(HashVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_digest_of_empty_input() {
        let hash = Hash::of([]);
        assert_eq!(
            hash.bytes(),
            &hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"),
        );
    }

    #[test]
    fn test_display_is_hex() {
        let hash = Hash::of(b"hello");
        assert_eq!(hash.to_string(), hex::encode(hash.bytes()));
    }

    #[test]
    fn test_try_from_rejects_wrong_length() {
        assert_eq!(
            Hash::try_from(&[0u8; 31][..]),
            Err(IncorrectLengthError)
        );
    }
}
