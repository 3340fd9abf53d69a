//! ECVRF-P256-SHA256-TAI (RFC 9381, suite 0x01).
//!
//! The VRF maps an opaque user label to the deterministic 32-byte index the
//! directory stores it under, with a proof that anyone holding the public
//! key can check. Hashing to the curve is try-and-increment, the nonce is
//! the RFC 6979 HMAC construction over the encoded hash point, and proofs
//! are `gamma (33) || c (16) || s (32)`.

use hmac::{Hmac, Mac};
use p256::elliptic_curve::bigint::U256;
use p256::elliptic_curve::ff::{Field, PrimeField};
use p256::elliptic_curve::group::Group;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{AffinePoint, EncodedPoint, FieldBytes, NonZeroScalar, ProjectivePoint, Scalar};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::hash::HASH_SIZE;

/// Suite octet for ECVRF-P256-SHA256-TAI.
const SUITE: u8 = 0x01;

/// Size in bytes of a compressed P-256 point.
const POINT_SIZE: usize = 33;

/// Size in bytes of the truncated challenge.
const CHALLENGE_SIZE: usize = 16;

/// Size in bytes of a serialized proof: `gamma || c || s`.
pub const PROOF_SIZE: usize = POINT_SIZE + CHALLENGE_SIZE + 32;

/// Size in bytes of the VRF output index.
pub const INDEX_SIZE: usize = HASH_SIZE;

/// Prefix used when rendering VRF keys as strings.
const KEY_PREFIX: &str = "ecvrf-p256";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VrfError {
    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid proof encoding")]
    InvalidProof,

    #[error("vrf verification failed")]
    VerificationFailed,
}

/// The private half of a VRF keypair.
#[derive(Clone)]
pub struct VrfPrivateKey {
    scalar: NonZeroScalar,
}

/// The public half of a VRF keypair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfPublicKey {
    point: AffinePoint,
}

impl VrfPrivateKey {
    /// Generates a fresh keypair from the system RNG.
    pub fn generate() -> Self {
        VrfPrivateKey {
            scalar: NonZeroScalar::random(&mut OsRng),
        }
    }

    /// Parses a private key from its 32-byte big-endian scalar encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VrfError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| VrfError::InvalidPrivateKey)?;
        let scalar = Option::from(Scalar::from_repr(FieldBytes::from(bytes)))
            .ok_or(VrfError::InvalidPrivateKey)?;
        let scalar = Option::from(NonZeroScalar::new(scalar)).ok_or(VrfError::InvalidPrivateKey)?;
        Ok(VrfPrivateKey { scalar })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        (*self.scalar.as_ref()).to_bytes().into()
    }

    pub fn public_key(&self) -> VrfPublicKey {
        let point = (ProjectivePoint::GENERATOR * *self.scalar.as_ref()).to_affine();
        VrfPublicKey { point }
    }

    /// Evaluates the VRF on `message`, returning the output index and the
    /// proof that [`VrfPublicKey::verify`] accepts.
    pub fn prove(&self, message: &[u8]) -> ([u8; INDEX_SIZE], [u8; PROOF_SIZE]) {
        let x = *self.scalar.as_ref();
        let public = self.public_key();
        let public_enc = public.point.to_encoded_point(true);

        let h = encode_to_curve(public_enc.as_bytes(), message);
        let h_enc = h.to_encoded_point(true);
        let gamma = (ProjectivePoint::from(h) * x).to_affine();

        let k = generate_nonce(&x, h_enc.as_bytes());
        let u = (ProjectivePoint::GENERATOR * k).to_affine();
        let v = (ProjectivePoint::from(h) * k).to_affine();

        let (c_scalar, c_bytes) = generate_challenge(&public.point, &h, &gamma, &u, &v);
        let s = c_scalar * x + k;

        let mut proof = [0u8; PROOF_SIZE];
        proof[..POINT_SIZE].copy_from_slice(gamma.to_encoded_point(true).as_bytes());
        proof[POINT_SIZE..POINT_SIZE + CHALLENGE_SIZE].copy_from_slice(&c_bytes);
        let s_bytes: [u8; 32] = s.to_bytes().into();
        proof[POINT_SIZE + CHALLENGE_SIZE..].copy_from_slice(&s_bytes);

        (proof_to_index(&gamma), proof)
    }
}

impl VrfPublicKey {
    /// Parses a public key from its 33-byte compressed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VrfError> {
        if bytes.len() != POINT_SIZE {
            return Err(VrfError::InvalidPublicKey);
        }
        let point = decode_point(bytes).ok_or(VrfError::InvalidPublicKey)?;
        Ok(VrfPublicKey { point })
    }

    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        let mut out = [0u8; POINT_SIZE];
        out.copy_from_slice(self.point.to_encoded_point(true).as_bytes());
        out
    }

    /// Checks `proof` against `message` and returns the output index it
    /// commits to. All failures collapse into [`VrfError::VerificationFailed`]
    /// except malformed encodings, which are [`VrfError::InvalidProof`].
    pub fn verify(&self, message: &[u8], proof: &[u8]) -> Result<[u8; INDEX_SIZE], VrfError> {
        if proof.len() != PROOF_SIZE {
            return Err(VrfError::InvalidProof);
        }
        let gamma = decode_point(&proof[..POINT_SIZE]).ok_or(VrfError::InvalidProof)?;

        let mut c_bytes = [0u8; CHALLENGE_SIZE];
        c_bytes.copy_from_slice(&proof[POINT_SIZE..POINT_SIZE + CHALLENGE_SIZE]);
        let c = challenge_scalar(&c_bytes);

        let s_bytes: [u8; 32] = proof[POINT_SIZE + CHALLENGE_SIZE..]
            .try_into()
            .map_err(|_| VrfError::InvalidProof)?;
        let s: Scalar = Option::from(Scalar::from_repr(FieldBytes::from(s_bytes)))
            .ok_or(VrfError::InvalidProof)?;

        let public_enc = self.point.to_encoded_point(true);
        let h = encode_to_curve(public_enc.as_bytes(), message);

        let u = ProjectivePoint::GENERATOR * s - ProjectivePoint::from(self.point) * c;
        let v = ProjectivePoint::from(h) * s - ProjectivePoint::from(gamma) * c;
        if bool::from(u.is_identity()) || bool::from(v.is_identity()) {
            return Err(VrfError::VerificationFailed);
        }

        let (_, expected) =
            generate_challenge(&self.point, &h, &gamma, &u.to_affine(), &v.to_affine());
        if expected != c_bytes {
            return Err(VrfError::VerificationFailed);
        }

        Ok(proof_to_index(&gamma))
    }
}

/// Hashes the public key and message to a curve point by try-and-increment.
///
/// A failure across all 256 counter values has negligible probability and
/// indicates a broken hash function, so it aborts.
fn encode_to_curve(public_key: &[u8], message: &[u8]) -> AffinePoint {
    for counter in 0..=255u8 {
        let mut hasher = Sha256::new();
        hasher.update([SUITE, 0x01]);
        hasher.update(public_key);
        hasher.update(message);
        hasher.update([counter, 0x00]);
        let digest: [u8; 32] = hasher.finalize().into();

        let mut candidate = [0u8; POINT_SIZE];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&digest);
        if let Some(point) = decode_point(&candidate) {
            return point;
        }
    }
    panic!("encode-to-curve failed after 256 attempts");
}

/// Decodes a compressed point, rejecting anything off-curve or the identity.
fn decode_point(bytes: &[u8]) -> Option<AffinePoint> {
    let encoded = EncodedPoint::from_bytes(bytes).ok()?;
    if encoded.is_identity() {
        return None;
    }
    Option::from(AffinePoint::from_encoded_point(&encoded))
}

/// RFC 6979 nonce generation over the encoded hash point.
fn generate_nonce(x: &Scalar, data: &[u8]) -> Scalar {
    let h1 = Sha256::digest(data);
    let x_bytes: [u8; 32] = x.to_bytes().into();
    // bits2octets: reduce h1 modulo the group order.
    let h1_reduced: [u8; 32] =
        <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(h1.as_slice()))
            .to_bytes()
            .into();

    let mut v = [0x01u8; 32];
    let mut key = [0x00u8; 32];

    key = hmac_sha256(&key, &[&v, &[0x00], &x_bytes, &h1_reduced]);
    v = hmac_sha256(&key, &[&v]);
    key = hmac_sha256(&key, &[&v, &[0x01], &x_bytes, &h1_reduced]);
    v = hmac_sha256(&key, &[&v]);

    for _ in 0..256 {
        v = hmac_sha256(&key, &[&v]);
        if let Some(k) = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(v))) {
            if k != Scalar::ZERO {
                return k;
            }
        }
        key = hmac_sha256(&key, &[&v, &[0x00]]);
        v = hmac_sha256(&key, &[&v]);
    }
    panic!("nonce generation failed after 256 attempts");
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// The challenge is the leftmost 16 bytes of a hash over the five points of
/// the proof transcript, interpreted as a scalar.
fn generate_challenge(
    public: &AffinePoint,
    h: &AffinePoint,
    gamma: &AffinePoint,
    u: &AffinePoint,
    v: &AffinePoint,
) -> (Scalar, [u8; CHALLENGE_SIZE]) {
    let mut hasher = Sha256::new();
    hasher.update([SUITE, 0x02]);
    for point in [public, h, gamma, u, v] {
        hasher.update(point.to_encoded_point(true).as_bytes());
    }
    hasher.update([0x00]);
    let digest: [u8; 32] = hasher.finalize().into();

    let mut c_bytes = [0u8; CHALLENGE_SIZE];
    c_bytes.copy_from_slice(&digest[..CHALLENGE_SIZE]);
    (challenge_scalar(&c_bytes), c_bytes)
}

fn challenge_scalar(c_bytes: &[u8; CHALLENGE_SIZE]) -> Scalar {
    let mut padded = [0u8; 32];
    padded[32 - CHALLENGE_SIZE..].copy_from_slice(c_bytes);
    // The challenge is 128 bits, so reduction never wraps.
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(&padded))
}

/// Derives the 32-byte output index from the proof point.
fn proof_to_index(gamma: &AffinePoint) -> [u8; INDEX_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update([SUITE, 0x03]);
    hasher.update(gamma.to_encoded_point(true).as_bytes());
    hasher.update([0x00]);
    hasher.finalize().into()
}

impl fmt::Display for VrfPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}:{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for VrfPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}:{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for VrfPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfPublicKey({})", hex::encode(self.to_bytes()))
    }
}

fn parse_key_body(s: &str, error: VrfError) -> Result<Vec<u8>, VrfError> {
    let body = s
        .strip_prefix(KEY_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or(error.clone())?;
    hex::decode(body).map_err(|_| error)
}

impl FromStr for VrfPrivateKey {
    type Err = VrfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VrfPrivateKey::from_bytes(&parse_key_body(s, VrfError::InvalidPrivateKey)?)
    }
}

impl FromStr for VrfPublicKey {
    type Err = VrfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VrfPublicKey::from_bytes(&parse_key_body(s, VrfError::InvalidPublicKey)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SK: [u8; 32] = hex!("c9afa9d845ba75166b5c215767b1d6934e50c3db36e89b127b8a622b120f6721");
    const PK: [u8; 33] =
        hex!("0360fed4ba255a9d31c961eb74c6356d68c049b8923b61fa6ce669622e60f29fb6");

    #[test]
    fn test_public_key_derivation() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        assert_eq!(private.public_key().to_bytes(), PK);
    }

    #[test]
    fn test_rfc9381_sample_vector() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        let (index, proof) = private.prove(b"sample");

        assert_eq!(
            proof.as_slice(),
            &hex!(
                "035b5c726e8c0e2c488a107c600578ee75cb702343c153cb1eb8dec77f4b5071b4"
                "a53f0a46f018bc2c56e58d383f2305e0"
                "975972c26feea0eb122fe7893c15af376b33edf7de17c6ea056d4d82de6bc02f"
            )[..],
        );
        assert_eq!(
            index,
            hex!("a3ad7b0ef73d8fc6655053ea22f9bede8c743f08bbed3d38821f0e16474b505e"),
        );

        let public = VrfPublicKey::from_bytes(&PK).unwrap();
        assert_eq!(public.verify(b"sample", &proof).unwrap(), index);
    }

    #[test]
    fn test_rfc9381_test_vector() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        let (index, proof) = private.prove(b"test");

        assert_eq!(
            proof.as_slice(),
            &hex!(
                "034dac60aba508ba0c01aa9be80377ebd7562c4a52d74722e0abae7dc3080ddb56"
                "c19e067b15a8a8174905b13617804534"
                "214f935b94c2287f797e393eb0816969d864f37625b443f30f1a5a33f2b3c854"
            )[..],
        );
        assert_eq!(
            index,
            hex!("a284f94ceec2ff4b3794629da7cbafa49121972671b466cab4ce170aa365f26d"),
        );

        let public = VrfPublicKey::from_bytes(&PK).unwrap();
        assert_eq!(public.verify(b"test", &proof).unwrap(), index);
    }

    #[test]
    fn test_prove_is_deterministic() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        assert_eq!(private.prove(b"message"), private.prove(b"message"));
        assert_ne!(private.prove(b"message").0, private.prove(b"other").0);
    }

    #[test]
    fn test_prove_verify_roundtrip() {
        let mut rng = StdRng::seed_from_u64(20);
        for _ in 0..8 {
            let private = loop {
                let bytes: [u8; 32] = rng.gen();
                if let Ok(key) = VrfPrivateKey::from_bytes(&bytes) {
                    break key;
                }
            };
            let public = private.public_key();

            let mut message = vec![0u8; rng.gen_range(0..64)];
            rng.fill(message.as_mut_slice());
            let (index, proof) = private.prove(&message);
            assert_eq!(public.verify(&message, &proof).unwrap(), index);
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        let public = private.public_key();
        let (_, proof) = private.prove(b"sample");

        for position in [0, 1, 17, 33, 40, 48, 49, 64, 80] {
            let mut tampered = proof;
            tampered[position] ^= 0x01;
            assert!(
                public.verify(b"sample", &tampered).is_err(),
                "flipping byte {position} was accepted",
            );
        }
    }

    #[test]
    fn test_tampered_message_fails() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        let public = private.public_key();
        let (_, proof) = private.prove(b"sample");
        assert_eq!(
            public.verify(b"samplf", &proof),
            Err(VrfError::VerificationFailed),
        );
    }

    #[test]
    fn test_wrong_length_proof_rejected() {
        let public = VrfPublicKey::from_bytes(&PK).unwrap();
        assert_eq!(
            public.verify(b"sample", &[0u8; 80]),
            Err(VrfError::InvalidProof),
        );
    }

    #[test]
    fn test_key_string_roundtrip() {
        let private = VrfPrivateKey::from_bytes(&SK).unwrap();
        let parsed: VrfPrivateKey = private.to_string().parse().unwrap();
        assert_eq!(parsed.to_bytes(), SK);

        let public: VrfPublicKey = private.public_key().to_string().parse().unwrap();
        assert_eq!(public.to_bytes(), PK);
    }
}
