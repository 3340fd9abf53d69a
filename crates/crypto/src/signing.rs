//! Signing keypairs for the head-signing layer above the directory core.
//!
//! The core never signs anything itself; it hands tree heads to this layer's
//! consumers. Both ECDSA-P256 and Ed25519 keys are supported, rendered as
//! `<algorithm>:<hex>` strings.

use rand_core::OsRng;
use signature::{Signer, Verifier};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A signature algorithm supported for tree heads.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    EcdsaP256,
    Ed25519,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::EcdsaP256 => write!(f, "ecdsa-p256"),
            SignatureAlgorithm::Ed25519 => write!(f, "ed25519"),
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecdsa-p256" => Ok(SignatureAlgorithm::EcdsaP256),
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            _ => Err(KeyParseError::UnknownAlgorithm(s.to_owned())),
        }
    }
}

#[derive(Error, Debug)]
pub enum KeyParseError {
    #[error("expected `<algorithm>:<hex>`")]
    IncorrectStructure,

    #[error("\"{0}\" is not a valid algorithm choice")]
    UnknownAlgorithm(String),

    #[error("hex decode failed")]
    Hex(#[from] hex::FromHexError),

    #[error("key could not be constructed from bytes")]
    InvalidKey,
}

/// Represents a private signing key.
pub enum PrivateKey {
    EcdsaP256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// Represents a public signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

/// A signature over a tree head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    EcdsaP256(p256::ecdsa::Signature),
    Ed25519(ed25519_dalek::Signature),
}

/// A freshly generated keypair.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

pub fn generate_p256_pair() -> KeyPair {
    let private = p256::ecdsa::SigningKey::random(&mut OsRng);
    let public = p256::ecdsa::VerifyingKey::from(&private);
    KeyPair {
        public: PublicKey::EcdsaP256(public),
        private: PrivateKey::EcdsaP256(private),
    }
}

pub fn generate_ed25519_pair() -> KeyPair {
    let private = ed25519_dalek::SigningKey::generate(&mut OsRng);
    let public = private.verifying_key();
    KeyPair {
        public: PublicKey::Ed25519(public),
        private: PrivateKey::Ed25519(private),
    }
}

impl PrivateKey {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::EcdsaP256(_) => SignatureAlgorithm::EcdsaP256,
            PrivateKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// The key's byte representation, without an algorithm specifier.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            PrivateKey::EcdsaP256(key) => key.to_bytes().to_vec(),
            PrivateKey::Ed25519(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn sign(&self, msg: &[u8]) -> Result<Signature, signature::Error> {
        match self {
            PrivateKey::EcdsaP256(key) => Ok(Signature::EcdsaP256(key.try_sign(msg)?)),
            PrivateKey::Ed25519(key) => Ok(Signature::Ed25519(key.try_sign(msg)?)),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::EcdsaP256(key) => {
                PublicKey::EcdsaP256(p256::ecdsa::VerifyingKey::from(key))
            }
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }
}

impl PublicKey {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PublicKey::EcdsaP256(_) => SignatureAlgorithm::EcdsaP256,
            PublicKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// The key's byte representation, without an algorithm specifier.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::EcdsaP256(key) => key.to_encoded_point(true).as_bytes().to_vec(),
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), signature::Error> {
        match (self, signature) {
            (PublicKey::EcdsaP256(key), Signature::EcdsaP256(sig)) => key.verify(msg, sig),
            (PublicKey::Ed25519(key), Signature::Ed25519(sig)) => key.verify(msg, sig),
            _ => Err(signature::Error::new()),
        }
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), hex::encode(self.bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), hex::encode(self.bytes()))
    }
}

fn split_key(s: &str) -> Result<(SignatureAlgorithm, Vec<u8>), KeyParseError> {
    let (algorithm, body) = s.split_once(':').ok_or(KeyParseError::IncorrectStructure)?;
    Ok((algorithm.parse()?, hex::decode(body)?))
}

impl FromStr for PrivateKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, bytes) = split_key(s)?;
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                let key = p256::ecdsa::SigningKey::from_slice(&bytes)
                    .map_err(|_| KeyParseError::InvalidKey)?;
                Ok(PrivateKey::EcdsaP256(key))
            }
            SignatureAlgorithm::Ed25519 => {
                let bytes: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| KeyParseError::InvalidKey)?;
                Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &bytes,
                )))
            }
        }
    }
}

impl FromStr for PublicKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, bytes) = split_key(s)?;
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&bytes)
                    .map_err(|_| KeyParseError::InvalidKey)?;
                Ok(PublicKey::EcdsaP256(key))
            }
            SignatureAlgorithm::Ed25519 => {
                let bytes: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| KeyParseError::InvalidKey)?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|_| KeyParseError::InvalidKey)?;
                Ok(PublicKey::Ed25519(key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_key_passes_verify() {
        for pair in [generate_p256_pair(), generate_ed25519_pair()] {
            let msg = (0..255u8).collect::<Vec<u8>>();
            let signature = pair.private.sign(&msg).unwrap();
            pair.public.verify(&msg, &signature).unwrap();
        }
    }

    #[test]
    fn test_wrong_key_fails_verify() {
        let alice = generate_p256_pair();
        let bob = generate_p256_pair();

        let msg = (0..255u8).collect::<Vec<u8>>();
        let alice_signature = alice.private.sign(&msg).unwrap();
        let bob_signature = bob.private.sign(&msg).unwrap();

        assert!(bob.public.verify(&msg, &alice_signature).is_err());
        assert!(alice.public.verify(&msg, &bob_signature).is_err());
    }

    #[test]
    fn test_mismatched_algorithm_fails_verify() {
        let p256 = generate_p256_pair();
        let ed25519 = generate_ed25519_pair();

        let msg = b"tree head";
        let signature = p256.private.sign(msg).unwrap();
        assert!(ed25519.public.verify(msg, &signature).is_err());
    }

    #[test]
    fn test_key_string_roundtrip() {
        for pair in [generate_p256_pair(), generate_ed25519_pair()] {
            let private: PrivateKey = pair.private.to_string().parse().unwrap();
            assert_eq!(private.bytes(), pair.private.bytes());

            let public: PublicKey = pair.public.to_string().parse().unwrap();
            assert_eq!(public, pair.public);
        }
    }
}
