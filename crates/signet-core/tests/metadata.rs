// crates/signet-core/tests/metadata.rs
// ============================================================================
// Module: Metadata Document Tests
// Description: Encoding, decoding, and structural edits of signed documents.
// Purpose: Keep the persisted document format stable and self-consistent.
// Dependencies: signet-core
// ============================================================================
//! ## Overview
//! Covers canonical encoding, type-tag checks, file meta, key identifiers,
//! root key replacement, and the unused delegation key sweep.

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

use signet_core::Delegations;
use signet_core::FileMeta;
use signet_core::KeyAlgorithm;
use signet_core::MetadataError;
use signet_core::PrivateKey;
use signet_core::PublicKey;
use signet_core::Role;
use signet_core::RoleName;
use signet_core::RootMeta;
use signet_core::Signed;
use signet_core::SignedRoot;
use signet_core::SignedSnapshot;
use signet_core::SignedTargets;
use signet_core::SnapshotMeta;
use signet_core::TargetsMeta;
use signet_core::Timestamp;
use signet_core::sha256_hex;

fn public(seed: u8) -> PublicKey {
    PrivateKey::ed25519_from_seed(&[seed; 32]).unwrap().public_key().clone()
}

fn expiry() -> Timestamp {
    Timestamp::from_unix_seconds(1_900_000_000).unwrap()
}

fn sample_root() -> RootMeta {
    let mut role_keys = BTreeMap::new();
    role_keys.insert(RoleName::Root, vec![public(1)]);
    role_keys.insert(RoleName::Targets, vec![public(2)]);
    role_keys.insert(RoleName::Snapshot, vec![public(3)]);
    role_keys.insert(RoleName::Timestamp, vec![public(4)]);
    RootMeta::new(expiry(), &role_keys)
}

// ============================================================================
// SECTION: Keys
// ============================================================================

#[test]
fn key_id_is_hash_of_canonical_public_key() {
    let key = public(7);
    let expected = sha256_hex(&key.canonical_bytes().unwrap());
    assert_eq!(key.id().as_str(), expected);
    assert_eq!(key.id().as_str().len(), 64);
    let rebuilt = PublicKey::new(KeyAlgorithm::Ed25519, key.public_bytes().to_vec()).unwrap();
    assert_eq!(rebuilt.id(), key.id());
}

#[test]
fn key_id_preimage_is_the_canonical_wire_record() {
    let key = public(7);
    let wire = serde_json::to_value(&key).unwrap();
    let canonical = serde_jcs::to_vec(&wire).unwrap();
    assert_eq!(key.canonical_bytes().unwrap(), canonical);
    assert!(canonical.starts_with(br#"{"algorithm":"ed25519","public":""#));
    assert_eq!(key.id().as_str(), sha256_hex(&canonical));
}

#[test]
fn public_keys_round_trip_through_json() {
    let key = public(8);
    let json = serde_json::to_string(&key).unwrap();
    let decoded: PublicKey = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, key);
    assert!(serde_json::from_str::<PublicKey>(r#"{"algorithm":"ed25519","public":""}"#).is_err());
    assert!(serde_json::from_str::<PublicKey>(r#"{"algorithm":"ed25519","public":"%%%"}"#).is_err());
}

#[test]
fn private_key_debug_is_redacted() {
    let key = PrivateKey::ed25519_from_seed(&[9; 32]).unwrap();
    let rendered = format!("{key:?}");
    assert!(!rendered.contains("09090909"));
    assert!(rendered.contains("<redacted>"));
    assert!(rendered.contains(key.id().as_str()));
}

// ============================================================================
// SECTION: File Meta
// ============================================================================

#[test]
fn file_meta_records_length_and_sha256() {
    let meta = FileMeta::from_bytes(b"hello");
    assert_eq!(meta.length, 5);
    assert_eq!(meta.sha256(), Some(sha256_hex(b"hello").as_str()));
    assert!(meta.matches(b"hello"));
    assert!(!meta.matches(b"hello!"));
}

// ============================================================================
// SECTION: Envelopes
// ============================================================================

#[test]
fn snapshot_round_trips_byte_for_byte() {
    let mut body = SnapshotMeta::new(expiry());
    body.version = 3;
    body.meta.insert(RoleName::Root, FileMeta::from_bytes(b"root"));
    body.meta.insert(RoleName::Targets, FileMeta::from_bytes(b"targets"));
    let document = Signed::unsigned(body);
    let bytes = document.encode().unwrap();
    let decoded = SignedSnapshot::decode(&bytes).unwrap();
    assert_eq!(decoded, document);
    assert_eq!(decoded.encode().unwrap(), bytes);
    assert_eq!(decoded.version(), 3);
}

#[test]
fn decoding_checks_the_type_tag() {
    let targets = Signed::unsigned(TargetsMeta::new(expiry())).encode().unwrap();
    let err = SignedSnapshot::decode(&targets).unwrap_err();
    assert_eq!(
        err,
        MetadataError::WrongKind {
            expected: "snapshot",
            found: "targets",
        }
    );
    assert!(matches!(SignedSnapshot::decode(b"{not json"), Err(MetadataError::Decode(_))));
}

#[test]
fn expiry_is_inclusive_of_the_expiry_instant() {
    let document = Signed::unsigned(SnapshotMeta::new(expiry()));
    assert!(document.is_expired(expiry()));
    assert!(!document.is_expired(Timestamp::from_unix_seconds(1_899_999_999).unwrap()));
}

#[test]
fn targets_without_delegations_decode_with_empty_listing() {
    let raw = r#"{"signatures":[],"signed":{"_type":"targets","expires":"2030-01-01T00:00:00Z","targets":{},"version":1}}"#;
    let decoded = SignedTargets::decode(raw.as_bytes()).unwrap();
    assert!(decoded.signed.delegations.is_empty());
}

// ============================================================================
// SECTION: Root
// ============================================================================

#[test]
fn root_resolves_canonical_roles() {
    let root = sample_root();
    let snapshot = root.base_role(&RoleName::Snapshot).unwrap();
    assert_eq!(snapshot.threshold, 1);
    assert!(snapshot.has_key(&public(3).id()));
    assert_eq!(root.keys.len(), 4);
    assert!(matches!(
        root.base_role(&RoleName::delegation("targets/x").unwrap()),
        Err(MetadataError::MissingRole(_))
    ));
}

#[test]
fn replacing_role_keys_purges_unused_root_keys() {
    let mut root = sample_root();
    root.replace_role_keys(&RoleName::Timestamp, &[public(5), public(6)], 2);
    let timestamp = root.base_role(&RoleName::Timestamp).unwrap();
    assert_eq!(timestamp.threshold, 2);
    assert_eq!(root.roles[&RoleName::Timestamp].key_ids, vec![public(5).id(), public(6).id()]);
    assert!(!root.keys.contains_key(&public(4).id()));
    assert_eq!(root.keys.len(), 5);
}

#[test]
fn root_round_trips_through_canonical_json() {
    let document: SignedRoot = Signed::unsigned(sample_root());
    let bytes = document.encode().unwrap();
    assert_eq!(SignedRoot::decode(&bytes).unwrap(), document);
}

// ============================================================================
// SECTION: Delegations
// ============================================================================

#[test]
fn unused_key_sweep_removes_only_unreferenced_keys() {
    let used = public(10);
    let orphan = public(11);
    let mut delegations = Delegations::default();
    delegations.keys.insert(used.id(), used.clone());
    delegations.keys.insert(orphan.id(), orphan.clone());
    delegations.roles.push(
        Role::new(
            RoleName::delegation("targets/a").unwrap(),
            1,
            &[used.id()],
            &["targets/a/*".to_string()],
        )
        .unwrap(),
    );
    let roles_before = delegations.roles.clone();

    let removed = delegations.purge_unused_keys();
    assert_eq!(removed, vec![orphan.id()]);
    assert!(delegations.keys.contains_key(&used.id()));
    assert_eq!(delegations.roles, roles_before);

    let again = delegations.purge_unused_keys();
    assert!(again.is_empty());
    assert_eq!(delegations.keys.len(), 1);
}

#[test]
fn delegation_role_resolution_requires_listed_keys() {
    let mut delegations = Delegations::default();
    let name = RoleName::delegation("targets/a").unwrap();
    delegations.roles.push(Role::new(name.clone(), 1, &[public(12).id()], &[]).unwrap());
    assert!(matches!(delegations.delegation_role(&name), Err(MetadataError::UnknownKey { .. })));
    delegations.keys.insert(public(12).id(), public(12));
    let resolved = delegations.delegation_role(&name).unwrap();
    assert_eq!(resolved.name(), &name);
    assert!(resolved.paths.is_empty());
}
