// crates/signet-core/tests/timestamp.rs
// ============================================================================
// Module: Timestamp Manager Tests
// Description: Get-or-create behavior for the timestamp document.
// Purpose: Keep the timestamp fresh and bound to the current snapshot.
// Dependencies: signet-core
// ============================================================================
//! ## Overview
//! Covers reuse of a fresh timestamp, regeneration on expiry and on snapshot
//! change, corruption, missing signing keys, and the change feed.

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
use std::sync::Arc;
use std::time::Duration;

use signet_core::CallContext;
use signet_core::CryptoService;
use signet_core::FixedClock;
use signet_core::Gun;
use signet_core::InMemoryCryptoService;
use signet_core::InMemoryMetaStore;
use signet_core::KeyAlgorithm;
use signet_core::MetaStore;
use signet_core::MetaUpdate;
use signet_core::RepoError;
use signet_core::RoleName;
use signet_core::RuntimeSettings;
use signet_core::SharedCryptoService;
use signet_core::SharedMetaStore;
use signet_core::SignError;
use signet_core::SignedSnapshot;
use signet_core::SignedTimestamp;
use signet_core::SnapshotError;
use signet_core::Timestamp;
use signet_core::TimestampManager;
use signet_core::TrustServices;
use signet_core::sha256_hex;

fn gun() -> Gun {
    Gun::new("example.com/app")
}

fn services() -> (TrustServices, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(Timestamp::from_unix_seconds(1_700_000_000).unwrap()));
    let services = TrustServices::new(
        SharedMetaStore::from_store(InMemoryMetaStore::new()),
        SharedCryptoService::from_service(InMemoryCryptoService::new()),
    )
    .with_clock(clock.clone());
    (services, clock)
}

fn seed_root(services: &TrustServices, gun: &Gun) {
    let ctx = CallContext::background();
    let mut role_keys = BTreeMap::new();
    for role in [RoleName::Root, RoleName::Targets, RoleName::Snapshot, RoleName::Timestamp] {
        let key = services.crypto.create(&role, gun, KeyAlgorithm::Ed25519).unwrap();
        role_keys.insert(role, vec![key]);
    }
    let mut repo = services.repo(gun);
    repo.init_root(&role_keys, services.expires_for(&RoleName::Root));
    let root = repo.sign_root(services.expires_for(&RoleName::Root), &ctx).unwrap();
    services.store.update_current(gun, MetaUpdate::from_signed(RoleName::Root, &root).unwrap()).unwrap();
}

fn stored_snapshot(services: &TrustServices) -> Vec<u8> {
    services.store.get_current(&gun(), &RoleName::Snapshot).unwrap().unwrap()
}

#[test]
fn first_call_creates_snapshot_and_timestamp() {
    let (services, _clock) = services();
    seed_root(&services, &gun());
    let manager = TimestampManager::new(services.clone());

    let bytes = manager.get_or_create_timestamp(&gun(), &CallContext::background()).unwrap();
    let timestamp = SignedTimestamp::decode(&bytes).unwrap();
    assert_eq!(timestamp.version(), 1);
    let snapshot = stored_snapshot(&services);
    assert!(timestamp.signed.snapshot_meta().unwrap().matches(&snapshot));
    assert_eq!(SignedSnapshot::decode(&snapshot).unwrap().version(), 1);
}

#[test]
fn fresh_timestamp_is_reused() {
    let (services, clock) = services();
    seed_root(&services, &gun());
    let manager = TimestampManager::new(services.clone());
    let ctx = CallContext::background();

    let first = manager.get_or_create_timestamp(&gun(), &ctx).unwrap();
    clock.advance(Duration::from_secs(3600));
    let second = manager.get_or_create_timestamp(&gun(), &ctx).unwrap();
    assert_eq!(first, second);
}

#[test]
fn expired_timestamp_is_regenerated_over_same_snapshot() {
    let (services, clock) = services();
    seed_root(&services, &gun());
    let manager = TimestampManager::new(services.clone());
    let ctx = CallContext::background();

    manager.get_or_create_timestamp(&gun(), &ctx).unwrap();
    let snapshot_before = stored_snapshot(&services);
    clock.advance(RuntimeSettings::default().expiry.timestamp + Duration::from_secs(1));
    let bytes = manager.get_or_create_timestamp(&gun(), &ctx).unwrap();

    let timestamp = SignedTimestamp::decode(&bytes).unwrap();
    assert_eq!(timestamp.version(), 2);
    assert_eq!(stored_snapshot(&services), snapshot_before);
    assert!(timestamp.signed.snapshot_meta().unwrap().matches(&snapshot_before));
}

#[test]
fn regenerated_snapshot_forces_a_new_timestamp() {
    let (services, clock) = services();
    seed_root(&services, &gun());
    let manager = TimestampManager::new(services.clone());
    let ctx = CallContext::background();

    manager.get_or_create_timestamp(&gun(), &ctx).unwrap();
    clock.advance(RuntimeSettings::default().expiry.snapshot + Duration::from_secs(1));
    let bytes = manager.get_or_create_timestamp(&gun(), &ctx).unwrap();

    let snapshot = stored_snapshot(&services);
    assert_eq!(SignedSnapshot::decode(&snapshot).unwrap().version(), 2);
    let timestamp = SignedTimestamp::decode(&bytes).unwrap();
    assert_eq!(timestamp.version(), 2);
    assert!(timestamp.signed.snapshot_meta().unwrap().matches(&snapshot));
}

#[test]
fn corrupt_timestamp_is_reported() {
    let (services, _clock) = services();
    seed_root(&services, &gun());
    services
        .store
        .update_current(
            &gun(),
            MetaUpdate {
                role: RoleName::Timestamp,
                version: 1,
                data: b"{\"signed\":{}}".to_vec(),
            },
        )
        .unwrap();
    let manager = TimestampManager::new(services);
    let err = manager.get_or_create_timestamp(&gun(), &CallContext::background()).unwrap_err();
    assert!(matches!(&err, SnapshotError::CorruptMetadata { role, .. } if role == "timestamp"));
}

#[test]
fn missing_timestamp_key_is_a_signing_failure() {
    let (services, _clock) = services();
    seed_root(&services, &gun());
    for key_id in services.crypto.list_keys(&RoleName::Timestamp).unwrap() {
        services.crypto.remove_key(&key_id).unwrap();
    }
    let manager = TimestampManager::new(services.clone());
    let err = manager.get_or_create_timestamp(&gun(), &CallContext::background()).unwrap_err();
    assert_eq!(
        err,
        SnapshotError::Repo(RepoError::Sign(SignError::KeyNotFound {
            role: "timestamp".to_string(),
            threshold: 1,
            available: 0,
        }))
    );
    assert_eq!(services.store.get_current(&gun(), &RoleName::Timestamp).unwrap(), None);
}

#[test]
fn each_new_timestamp_lands_in_the_change_feed() {
    let (services, clock) = services();
    seed_root(&services, &gun());
    let manager = TimestampManager::new(services.clone());
    let ctx = CallContext::background();

    let first = manager.get_or_create_timestamp(&gun(), &ctx).unwrap();
    manager.get_or_create_timestamp(&gun(), &ctx).unwrap();
    clock.advance(RuntimeSettings::default().expiry.timestamp);
    let second = manager.get_or_create_timestamp(&gun(), &ctx).unwrap();

    let changes = services.store.changes(0, 10, Some(&gun())).unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].checksum, sha256_hex(&first));
    assert_eq!(changes[1].checksum, sha256_hex(&second));
    assert_eq!(changes[1].version, 2);
}
