// crates/signet-core/tests/document_round_trip.rs
// ============================================================================
// Module: Document Round-Trip Property Tests
// Description: Property-based encode/decode checks for all four document kinds.
// Purpose: Keep persisted bytes stable under decode and re-encode.
// Dependencies: signet-core, proptest
// ============================================================================
//! ## Overview
//! Generates arbitrary root, targets, snapshot, and timestamp documents with
//! signatures attached, then checks that decoding the canonical encoding
//! yields the same document and that re-encoding yields the same bytes.

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
use std::fmt::Debug;

use proptest::prelude::*;
use signet_core::Delegations;
use signet_core::Document;
use signet_core::FileMeta;
use signet_core::HashAlgorithm;
use signet_core::PrivateKey;
use signet_core::PublicKey;
use signet_core::Role;
use signet_core::RoleName;
use signet_core::RootMeta;
use signet_core::Signature;
use signet_core::SignatureMethod;
use signet_core::Signed;
use signet_core::SignedRoot;
use signet_core::SignedSnapshot;
use signet_core::SignedTargets;
use signet_core::SignedTimestamp;
use signet_core::SnapshotMeta;
use signet_core::TargetsMeta;
use signet_core::Timestamp;
use signet_core::TimestampMeta;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn public(seed: u8) -> PublicKey {
    PrivateKey::ed25519_from_seed(&[seed; 32]).unwrap().public_key().clone()
}

fn publics(seeds: &BTreeSet<u8>) -> Vec<PublicKey> {
    seeds.iter().copied().map(public).collect()
}

fn assert_round_trip<T>(document: &Signed<T>) -> Result<(), TestCaseError>
where
    T: Document + PartialEq + Debug,
{
    let bytes = document.encode().unwrap();
    let decoded = Signed::<T>::decode(&bytes).unwrap();
    prop_assert_eq!(&decoded, document);
    prop_assert_eq!(decoded.encode().unwrap(), bytes);
    Ok(())
}

// ============================================================================
// SECTION: Strategies
// ============================================================================

fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0_i64..4_102_444_800).prop_map(|seconds| Timestamp::from_unix_seconds(seconds).unwrap())
}

fn key_seeds() -> impl Strategy<Value = BTreeSet<u8>> {
    prop::collection::btree_set(any::<u8>(), 1..4)
}

fn signature_method() -> impl Strategy<Value = SignatureMethod> {
    prop_oneof![
        Just(SignatureMethod::Ed25519),
        Just(SignatureMethod::Ecdsa),
        Just(SignatureMethod::RsaPss),
    ]
}

prop_compose! {
    fn signature()(
        seed in any::<u8>(),
        method in signature_method(),
        raw in prop::collection::vec(any::<u8>(), 0..80),
    ) -> Signature {
        Signature {
            key_id: public(seed).id(),
            method,
            signature: raw,
            is_valid: false,
        }
    }
}

fn signatures() -> impl Strategy<Value = Vec<Signature>> {
    prop::collection::vec(signature(), 0..3)
}

prop_compose! {
    fn file_meta()(length in any::<u64>(), digest in "[0-9a-f]{64}") -> FileMeta {
        let mut hashes = BTreeMap::new();
        hashes.insert(HashAlgorithm::Sha256, digest);
        FileMeta { length, hashes }
    }
}

fn delegation_name() -> impl Strategy<Value = RoleName> {
    prop::collection::vec("[a-z0-9_-]{1,8}", 1..3)
        .prop_map(|segments| RoleName::delegation(&format!("targets/{}", segments.join("/"))).unwrap())
}

fn any_role_name() -> impl Strategy<Value = RoleName> {
    prop_oneof![
        Just(RoleName::Root),
        Just(RoleName::Targets),
        Just(RoleName::Snapshot),
        Just(RoleName::Timestamp),
        delegation_name(),
    ]
}

prop_compose! {
    fn delegated_role()(
        name in delegation_name(),
        seeds in key_seeds(),
        threshold in 1_u32..4,
        paths in prop::collection::vec("[a-z0-9/._-]{0,12}", 0..3),
    ) -> Role {
        Role {
            name,
            key_ids: publics(&seeds).iter().map(|key| key.id()).collect(),
            threshold,
            paths,
        }
    }
}

prop_compose! {
    fn delegations()(
        seeds in prop::collection::btree_set(any::<u8>(), 0..4),
        roles in prop::collection::vec(delegated_role(), 0..3),
    ) -> Delegations {
        Delegations {
            keys: publics(&seeds).into_iter().map(|key| (key.id(), key)).collect(),
            roles,
        }
    }
}

prop_compose! {
    fn root_document()(
        version in any::<u64>(),
        expires in timestamp(),
        consistent_snapshot in any::<bool>(),
        role_seeds in prop::collection::vec(key_seeds(), 4),
        thresholds in prop::collection::vec(1_u32..4, 4),
        signatures in signatures(),
    ) -> SignedRoot {
        let names = [RoleName::Root, RoleName::Targets, RoleName::Snapshot, RoleName::Timestamp];
        let role_keys: BTreeMap<RoleName, Vec<PublicKey>> = names
            .iter()
            .cloned()
            .zip(role_seeds.iter().map(publics))
            .collect();
        let mut body = RootMeta::new(expires, &role_keys);
        body.version = version;
        body.consistent_snapshot = consistent_snapshot;
        for (name, threshold) in names.iter().zip(thresholds) {
            if let Some(role) = body.roles.get_mut(name) {
                role.threshold = threshold;
            }
        }
        Signed { signatures, signed: body }
    }
}

prop_compose! {
    fn targets_document()(
        version in any::<u64>(),
        expires in timestamp(),
        targets in prop::collection::btree_map("[ -~]{1,24}", file_meta(), 0..5),
        delegations in delegations(),
        signatures in signatures(),
    ) -> SignedTargets {
        let mut body = TargetsMeta::new(expires);
        body.version = version;
        body.targets = targets;
        body.delegations = delegations;
        Signed { signatures, signed: body }
    }
}

prop_compose! {
    fn snapshot_document()(
        version in any::<u64>(),
        expires in timestamp(),
        meta in prop::collection::btree_map(any_role_name(), file_meta(), 0..6),
        signatures in signatures(),
    ) -> SignedSnapshot {
        let mut body = SnapshotMeta::new(expires);
        body.version = version;
        body.meta = meta;
        Signed { signatures, signed: body }
    }
}

prop_compose! {
    fn timestamp_document()(
        version in any::<u64>(),
        expires in timestamp(),
        snapshot in prop::option::of(file_meta()),
        signatures in signatures(),
    ) -> SignedTimestamp {
        let mut body = TimestampMeta::new(expires);
        body.version = version;
        if let Some(meta) = snapshot {
            body.meta.insert(RoleName::Snapshot, meta);
        }
        Signed { signatures, signed: body }
    }
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn root_documents_round_trip(document in root_document()) {
        assert_round_trip(&document)?;
    }

    #[test]
    fn targets_documents_round_trip(document in targets_document()) {
        assert_round_trip(&document)?;
    }

    #[test]
    fn snapshot_documents_round_trip(document in snapshot_document()) {
        assert_round_trip(&document)?;
    }

    #[test]
    fn timestamp_documents_round_trip(document in timestamp_document()) {
        assert_round_trip(&document)?;
    }

    #[test]
    fn canonical_encoding_is_independent_of_signature_cache(document in snapshot_document()) {
        let mut cached = document.clone();
        for signature in &mut cached.signatures {
            signature.is_valid = true;
        }
        prop_assert_eq!(cached.encode().unwrap(), document.encode().unwrap());
    }
}
