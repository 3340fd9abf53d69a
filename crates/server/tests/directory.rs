//! End-to-end flow: update labels, commit heads, and verify answers the way
//! a client would.

use keytrans_crypto::vrf::VrfPrivateKey;
use keytrans_server::{Directory, DirectoryError, MemoryBackend, TreeHead};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn test_vrf_key() -> VrfPrivateKey {
    VrfPrivateKey::from_bytes(&[0x17; 32]).expect("static test scalar")
}

#[test]
fn test_update_commit_search_verify() {
    let mut directory = Directory::open(MemoryBackend::new(), test_vrf_key()).unwrap();
    let public_key = directory.vrf_public_key();

    directory.update(b"alice", 0, b"alice-key-v0").unwrap();
    directory.update(b"bob", 0, b"bob-key-v0").unwrap();
    directory.update(b"alice", 1, b"alice-key-v1").unwrap();
    let head = directory.commit().unwrap().expect("head");
    assert_eq!(head.size, 2);

    // A present label verifies as an inclusion and carries its record.
    let output = directory.search(b"alice", 1).unwrap();
    let verified = output.verify(&public_key, b"alice", &head).unwrap();
    assert!(verified.inclusion);
    assert_eq!(output.record, Some(b"alice-key-v1".to_vec()));

    // An absent label verifies as an exclusion with no record.
    let output = directory.search(b"carol", 0).unwrap();
    let verified = output.verify(&public_key, b"carol", &head).unwrap();
    assert!(!verified.inclusion);
    assert_eq!(output.record, None);
}

#[test]
fn test_versions_are_monotone_per_label() {
    let mut directory = Directory::open(MemoryBackend::new(), test_vrf_key()).unwrap();

    directory.update(b"alice", 0, b"v0").unwrap();
    assert!(matches!(
        directory.update(b"alice", 0, b"rewrite"),
        Err(DirectoryError::NonMonotonicVersion(0)),
    ));
    assert!(matches!(
        directory.update(b"alice", 2, b"skip"),
        Err(DirectoryError::NonMonotonicVersion(2)),
    ));
    directory.update(b"alice", 1, b"v1").unwrap();
}

#[test]
fn test_directory_resumes_from_committed_head() {
    let backend = Arc::new(MemoryBackend::new());

    let first_head = {
        let mut directory = Directory::open(backend.clone(), test_vrf_key()).unwrap();
        for i in 0..20u8 {
            directory.update(&[i], 0, b"record").unwrap();
        }
        directory.commit().unwrap().expect("head")
    };
    assert_eq!(first_head.size, 20);

    let mut directory = Directory::open(backend, test_vrf_key()).unwrap();
    assert_eq!(directory.size(), 20);
    let public_key = directory.vrf_public_key();

    let output = directory.search(&[7u8], 0).unwrap();
    let verified = output.verify(&public_key, &[7u8], &first_head).unwrap();
    assert!(verified.inclusion);

    // Extending the directory after reopening still yields verifying heads.
    directory.update(b"late", 0, b"record").unwrap();
    let head = directory.commit().unwrap().expect("head");
    assert_eq!(head.size, 21);
    let output = directory.search(b"late", 0).unwrap();
    assert!(output
        .verify(&public_key, b"late", &head)
        .unwrap()
        .inclusion);
}

#[test]
fn test_verify_rejects_the_wrong_label() {
    let mut directory = Directory::open(MemoryBackend::new(), test_vrf_key()).unwrap();
    let public_key = directory.vrf_public_key();

    directory.update(b"alice", 0, b"record").unwrap();
    let head = directory.commit().unwrap().expect("head");

    let output = directory.search(b"alice", 0).unwrap();
    assert!(output.verify(&public_key, b"mallory", &head).is_err());
}

#[test]
fn test_head_encoding_roundtrip() {
    let head = TreeHead {
        size: 300,
        root: [0xc3; 32].into(),
    };
    assert_eq!(TreeHead::decode(&head.encode()).unwrap(), head);
    assert!(TreeHead::decode(&head.encode()[..30]).is_err());
}
