// crates/signet-core/tests/pinning.rs
// ============================================================================
// Module: Trust Pinning Tests
// Description: Pinning policies and untrusted root bootstrap.
// Purpose: Ensure fetched roots are checked against pins before use.
// Dependencies: signet-core
// ============================================================================
//! ## Overview
//! Publishes a namespace, then re-reads its root through the pinning
//! policies and through a fresh working set.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use signet_core::CallContext;
use signet_core::CryptoService;
use signet_core::Gun;
use signet_core::InMemoryCryptoService;
use signet_core::InMemoryMetaStore;
use signet_core::KeyId;
use signet_core::MetaStore;
use signet_core::MetadataError;
use signet_core::PrivateKey;
use signet_core::Publisher;
use signet_core::RepoError;
use signet_core::RoleName;
use signet_core::Signature;
use signet_core::SharedCryptoService;
use signet_core::SharedMetaStore;
use signet_core::SignedRoot;
use signet_core::TrustPinConfig;
use signet_core::TrustPinError;
use signet_core::TrustPinning;
use signet_core::TrustRepo;
use signet_core::TrustServices;

fn gun() -> Gun {
    Gun::new("example.com/app")
}

fn published() -> (InMemoryCryptoService, Vec<u8>) {
    let crypto = InMemoryCryptoService::new();
    let store = InMemoryMetaStore::new();
    let services = TrustServices::new(
        SharedMetaStore::from_store(store.clone()),
        SharedCryptoService::from_service(crypto.clone()),
    );
    Publisher::new(services).initialize(&gun(), &[], &[], &CallContext::background()).unwrap();
    let root = store.get_current(&gun(), &RoleName::Root).unwrap().unwrap();
    (crypto, root)
}

fn root_key(crypto: &InMemoryCryptoService) -> KeyId {
    crypto.list_keys(&RoleName::Root).unwrap().remove(0)
}

fn pins(gun: Gun, keys: impl IntoIterator<Item = KeyId>) -> TrustPinConfig {
    let mut map = BTreeMap::new();
    map.insert(gun, keys.into_iter().collect::<BTreeSet<KeyId>>());
    TrustPinConfig::PinnedKeys(map)
}

/// Files `attacker` under `listed` in the root key map and re-signs the root
/// with it, claiming the signature came from `listed`.
fn relabelled(bytes: &[u8], listed: &KeyId, attacker: &PrivateKey) -> Vec<u8> {
    let mut root = SignedRoot::decode(bytes).unwrap();
    root.signed.version = 99;
    root.signed.keys.insert(listed.clone(), attacker.public_key().clone());
    root.signatures.clear();
    let payload = root.signed_bytes().unwrap();
    root.signatures.push(Signature {
        key_id: listed.clone(),
        method: attacker.algorithm().signature_method(),
        signature: attacker.sign(&payload),
        is_valid: false,
    });
    root.encode().unwrap()
}

fn tampered(bytes: &[u8]) -> Vec<u8> {
    let mut root = SignedRoot::decode(bytes).unwrap();
    root.signed.version = root.signed.version.saturating_add(7);
    root.encode().unwrap()
}

// ============================================================================
// SECTION: Policies
// ============================================================================

#[test]
fn tofu_accepts_any_root() {
    let (_crypto, bytes) = published();
    let root = SignedRoot::decode(&bytes).unwrap();
    assert!(TrustPinConfig::Tofu.check_root(&gun(), &root).is_ok());
}

#[test]
fn pinned_root_key_is_accepted() {
    let (crypto, bytes) = published();
    let root = SignedRoot::decode(&bytes).unwrap();
    assert!(pins(gun(), [root_key(&crypto)]).check_root(&gun(), &root).is_ok());
}

#[test]
fn unpinned_namespaces_and_keys_are_rejected() {
    let (crypto, bytes) = published();
    let root = SignedRoot::decode(&bytes).unwrap();
    let other_namespace = pins(Gun::new("example.com/other"), [root_key(&crypto)]);
    assert!(matches!(other_namespace.check_root(&gun(), &root), Err(TrustPinError::Rejected { .. })));

    let targets_key = crypto.list_keys(&RoleName::Targets).unwrap().remove(0);
    let non_signer = pins(gun(), [targets_key]);
    assert!(matches!(non_signer.check_root(&gun(), &root), Err(TrustPinError::Rejected { .. })));
}

#[test]
fn empty_pin_sets_are_invalid() {
    let (_crypto, bytes) = published();
    let root = SignedRoot::decode(&bytes).unwrap();
    let empty = pins(gun(), Vec::new());
    assert!(matches!(empty.check_root(&gun(), &root), Err(TrustPinError::Invalid(_))));
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[test]
fn bootstrap_accepts_a_pinned_self_signed_root() {
    let (crypto, bytes) = published();
    let mut repo = TrustRepo::new(gun(), &crypto);
    repo.bootstrap_root(&bytes, &pins(gun(), [root_key(&crypto)])).unwrap();
    assert_eq!(repo.root().unwrap().signed.version, 1);
}

#[test]
fn bootstrap_rejects_tampered_roots() {
    let (crypto, bytes) = published();
    let forged = tampered(&bytes);

    let mut repo = TrustRepo::new(gun(), &crypto);
    let err = repo.bootstrap_root(&forged, &TrustPinConfig::Tofu).unwrap_err();
    assert!(matches!(err, RepoError::Verify(_)));
    assert!(repo.root().is_err());

    let err = repo.bootstrap_root(&forged, &pins(gun(), [root_key(&crypto)])).unwrap_err();
    assert!(matches!(err, RepoError::TrustPin(TrustPinError::Rejected { .. })));
}

#[test]
fn bootstrap_rejects_undecodable_bytes() {
    let (crypto, _bytes) = published();
    let mut repo = TrustRepo::new(gun(), &crypto);
    assert!(matches!(
        repo.bootstrap_root(b"not a root", &TrustPinConfig::Tofu),
        Err(RepoError::Metadata(_))
    ));
}

#[test]
fn pins_match_the_key_material_not_the_listed_id() {
    let (crypto, bytes) = published();
    let pinned = root_key(&crypto);
    let attacker = PrivateKey::ed25519_from_seed(&[42; 32]).unwrap();
    let forged = relabelled(&bytes, &pinned, &attacker);
    let root = SignedRoot::decode(&forged).unwrap();

    assert!(matches!(
        pins(gun(), [pinned.clone()]).check_root(&gun(), &root),
        Err(TrustPinError::Rejected { .. })
    ));

    let mut repo = TrustRepo::new(gun(), &crypto);
    let err = repo.bootstrap_root(&forged, &pins(gun(), [pinned.clone()])).unwrap_err();
    assert!(matches!(err, RepoError::TrustPin(TrustPinError::Rejected { .. })));
    assert!(repo.root().is_err());

    let err = repo.bootstrap_root(&forged, &TrustPinConfig::Tofu).unwrap_err();
    assert_eq!(
        err,
        RepoError::Metadata(MetadataError::KeyIdMismatch {
            listed: pinned,
            derived: attacker.id(),
        })
    );
    assert!(repo.root().is_err());

    repo.bootstrap_root(&bytes, &pins(gun(), [root_key(&crypto)])).unwrap();
    assert_eq!(repo.root().unwrap().signed.version, 1);
}
