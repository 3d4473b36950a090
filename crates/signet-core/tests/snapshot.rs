// crates/signet-core/tests/snapshot.rs
// ============================================================================
// Module: Snapshot Manager Tests
// Description: Get-or-create behavior for the snapshot document.
// Purpose: Validate caching, regeneration, corruption, and retry handling.
// Dependencies: signet-core
// ============================================================================
//! ## Overview
//! Drives the snapshot manager against the in-memory store and crypto
//! service with a fixed clock so expiry decisions are deterministic.

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
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use signet_core::CallContext;
use signet_core::Change;
use signet_core::CryptoService;
use signet_core::ErrorClass;
use signet_core::FixedClock;
use signet_core::Gun;
use signet_core::InMemoryCryptoService;
use signet_core::InMemoryMetaStore;
use signet_core::Interrupted;
use signet_core::KeyAlgorithm;
use signet_core::MetaStore;
use signet_core::MetaUpdate;
use signet_core::RoleName;
use signet_core::RuntimeSettings;
use signet_core::SharedCryptoService;
use signet_core::SharedMetaStore;
use signet_core::SignedSnapshot;
use signet_core::SnapshotError;
use signet_core::SnapshotManager;
use signet_core::StoreError;
use signet_core::Timestamp;
use signet_core::TrustServices;
use signet_core::runtime::TrustAuditEvent;
use signet_core::runtime::TrustAuditKind;
use signet_core::runtime::TrustAuditSink;
use signet_core::sha256_hex;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TrustAuditEvent>>,
}

impl RecordingSink {
    fn count(&self, kind: TrustAuditKind) -> usize {
        self.events.lock().unwrap().iter().filter(|event| event.event == kind.as_str()).count()
    }
}

impl TrustAuditSink for RecordingSink {
    fn record(&self, event: &TrustAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Store that rejects the first single-document write with a version conflict.
struct ConflictOnceStore {
    inner: InMemoryMetaStore,
    raised: AtomicBool,
}

impl MetaStore for ConflictOnceStore {
    fn get_current(&self, gun: &Gun, role: &RoleName) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_current(gun, role)
    }

    fn update_current(&self, gun: &Gun, update: MetaUpdate) -> Result<(), StoreError> {
        if !self.raised.swap(true, Ordering::SeqCst) {
            return Err(StoreError::VersionConflict {
                gun: gun.clone(),
                role: update.role.to_string(),
                attempted: update.version,
                current: update.version,
            });
        }
        self.inner.update_current(gun, update)
    }

    fn update_many(&self, gun: &Gun, updates: Vec<MetaUpdate>) -> Result<(), StoreError> {
        self.inner.update_many(gun, updates)
    }

    fn get_checksum(&self, gun: &Gun, role: &RoleName, checksum: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_checksum(gun, role, checksum)
    }

    fn get_version(&self, gun: &Gun, role: &RoleName, version: u64) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_version(gun, role, version)
    }

    fn delete(&self, gun: &Gun) -> Result<(), StoreError> {
        self.inner.delete(gun)
    }

    fn changes(&self, after: u64, limit: usize, gun_filter: Option<&Gun>) -> Result<Vec<Change>, StoreError> {
        self.inner.changes(after, limit, gun_filter)
    }
}

struct Harness {
    services: TrustServices,
    clock: Arc<FixedClock>,
    audit: Arc<RecordingSink>,
}

fn harness_with_store(store: SharedMetaStore) -> Harness {
    let clock = Arc::new(FixedClock::new(Timestamp::from_unix_seconds(1_700_000_000).unwrap()));
    let audit = Arc::new(RecordingSink::default());
    let services = TrustServices::new(store, SharedCryptoService::from_service(InMemoryCryptoService::new()))
        .with_clock(clock.clone())
        .with_audit(audit.clone());
    Harness {
        services,
        clock,
        audit,
    }
}

fn harness() -> Harness {
    harness_with_store(SharedMetaStore::from_store(InMemoryMetaStore::new()))
}

fn gun() -> Gun {
    Gun::new("example.com/app")
}

/// Stores a signed version-1 root and returns its bytes.
fn seed_root(services: &TrustServices, gun: &Gun) -> Vec<u8> {
    let ctx = CallContext::background();
    let mut role_keys = BTreeMap::new();
    for role in [RoleName::Root, RoleName::Targets, RoleName::Snapshot, RoleName::Timestamp] {
        let key = services.crypto.create(&role, gun, KeyAlgorithm::Ed25519).unwrap();
        role_keys.insert(role, vec![key]);
    }
    let mut repo = services.repo(gun);
    repo.init_root(&role_keys, services.expires_for(&RoleName::Root));
    let root = repo.sign_root(services.expires_for(&RoleName::Root), &ctx).unwrap();
    let update = MetaUpdate::from_signed(RoleName::Root, &root).unwrap();
    let bytes = update.data.clone();
    services.store.update_current(gun, update).unwrap();
    bytes
}

fn snapshot_lifetime() -> Duration {
    RuntimeSettings::default().expiry.snapshot
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn first_call_creates_version_one_over_stored_root() {
    let harness = harness();
    let root_bytes = seed_root(&harness.services, &gun());
    let manager = SnapshotManager::new(harness.services.clone());

    let bytes = manager.get_or_create_snapshot(&gun(), &CallContext::background()).unwrap();
    let snapshot = SignedSnapshot::decode(&bytes).unwrap();
    assert_eq!(snapshot.version(), 1);
    let root_meta = &snapshot.signed.meta[&RoleName::Root];
    assert_eq!(root_meta.sha256(), Some(sha256_hex(&root_bytes).as_str()));
    assert_eq!(root_meta.length, u64::try_from(root_bytes.len()).unwrap());
    assert!(!snapshot.signed.meta.contains_key(&RoleName::Targets));
    assert_eq!(harness.services.store.get_current(&gun(), &RoleName::Snapshot).unwrap(), Some(bytes));
    assert_eq!(snapshot.expires(), harness.services.now().saturating_add(snapshot_lifetime()));
}

#[test]
fn unexpired_snapshot_is_returned_unchanged() {
    let harness = harness();
    seed_root(&harness.services, &gun());
    let manager = SnapshotManager::new(harness.services.clone());
    let ctx = CallContext::background();

    let first = manager.get_or_create_snapshot(&gun(), &ctx).unwrap();
    harness.clock.advance(Duration::from_secs(60));
    let second = manager.get_or_create_snapshot(&gun(), &ctx).unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.audit.count(TrustAuditKind::SnapshotRegenerated), 1);
}

#[test]
fn expired_snapshot_is_regenerated_with_next_version() {
    let harness = harness();
    seed_root(&harness.services, &gun());
    let manager = SnapshotManager::new(harness.services.clone());
    let ctx = CallContext::background();

    let first = SignedSnapshot::decode(&manager.get_or_create_snapshot(&gun(), &ctx).unwrap()).unwrap();
    harness.clock.advance(snapshot_lifetime() + Duration::from_secs(1));
    let second = SignedSnapshot::decode(&manager.get_or_create_snapshot(&gun(), &ctx).unwrap()).unwrap();

    assert_eq!(second.version(), 2);
    assert!(second.expires() > first.expires());
    assert_eq!(second.signed.meta[&RoleName::Root], first.signed.meta[&RoleName::Root]);
    assert!(harness.services.store.get_version(&gun(), &RoleName::Snapshot, 1).unwrap().is_some());
    assert_eq!(harness.audit.count(TrustAuditKind::SnapshotRegenerated), 2);
}

#[test]
fn snapshot_expiring_exactly_now_counts_as_expired() {
    let harness = harness();
    seed_root(&harness.services, &gun());
    let manager = SnapshotManager::new(harness.services.clone());
    let ctx = CallContext::background();

    manager.get_or_create_snapshot(&gun(), &ctx).unwrap();
    harness.clock.advance(snapshot_lifetime());
    let second = SignedSnapshot::decode(&manager.get_or_create_snapshot(&gun(), &ctx).unwrap()).unwrap();
    assert_eq!(second.version(), 2);
}

#[test]
fn corrupt_snapshot_is_reported() {
    let harness = harness();
    seed_root(&harness.services, &gun());
    harness
        .services
        .store
        .update_current(
            &gun(),
            MetaUpdate {
                role: RoleName::Snapshot,
                version: 1,
                data: b"not json".to_vec(),
            },
        )
        .unwrap();
    let manager = SnapshotManager::new(harness.services.clone());
    let err = manager.get_or_create_snapshot(&gun(), &CallContext::background()).unwrap_err();
    assert!(matches!(&err, SnapshotError::CorruptMetadata { role, .. } if role == "snapshot"));
    assert_eq!(err.class(), ErrorClass::Integrity);
}

#[test]
fn missing_root_is_reported() {
    let harness = harness();
    let manager = SnapshotManager::new(harness.services.clone());
    let err = manager.get_or_create_snapshot(&gun(), &CallContext::background()).unwrap_err();
    assert_eq!(err, SnapshotError::RootMissing { gun: gun() });
    assert_eq!(err.class(), ErrorClass::Validation);
    assert_eq!(harness.services.store.get_current(&gun(), &RoleName::Snapshot).unwrap(), None);
}

#[test]
fn missing_snapshot_key_fails_without_writing() {
    let harness = harness();
    seed_root(&harness.services, &gun());
    for key_id in harness.services.crypto.list_keys(&RoleName::Snapshot).unwrap() {
        harness.services.crypto.remove_key(&key_id).unwrap();
    }
    let manager = SnapshotManager::new(harness.services.clone());
    let err = manager.get_or_create_snapshot(&gun(), &CallContext::background()).unwrap_err();
    assert!(matches!(err, SnapshotError::Repo(_)));
    assert_eq!(harness.services.store.get_current(&gun(), &RoleName::Snapshot).unwrap(), None);
}

#[test]
fn cancelled_context_stops_before_any_work() {
    let harness = harness();
    seed_root(&harness.services, &gun());
    let ctx = CallContext::background();
    ctx.cancel();
    let manager = SnapshotManager::new(harness.services.clone());
    let err = manager.get_or_create_snapshot(&gun(), &ctx).unwrap_err();
    assert_eq!(err, SnapshotError::Interrupted(Interrupted::Cancelled));
    assert_eq!(err.class(), ErrorClass::Availability);
    assert_eq!(harness.services.store.get_current(&gun(), &RoleName::Snapshot).unwrap(), None);
}

#[test]
fn version_conflict_is_retried() {
    let store = ConflictOnceStore {
        inner: InMemoryMetaStore::new(),
        raised: AtomicBool::new(false),
    };
    let harness = harness_with_store(SharedMetaStore::from_store(store));
    let gun = gun();
    let root = seed_root_via_batch(&harness.services, &gun);
    assert!(!root.is_empty());

    let manager = SnapshotManager::new(harness.services.clone());
    let bytes = manager.get_or_create_snapshot(&gun, &CallContext::background()).unwrap();
    assert_eq!(SignedSnapshot::decode(&bytes).unwrap().version(), 1);
    assert_eq!(harness.audit.count(TrustAuditKind::VersionConflictRetry), 1);
}

#[test]
fn exhausted_retries_surface_the_conflict() {
    let store = ConflictOnceStore {
        inner: InMemoryMetaStore::new(),
        raised: AtomicBool::new(false),
    };
    let mut harness = harness_with_store(SharedMetaStore::from_store(store));
    harness.services.settings.max_retries = 0;
    let gun = gun();
    seed_root_via_batch(&harness.services, &gun);

    let manager = SnapshotManager::new(harness.services.clone());
    let err = manager.get_or_create_snapshot(&gun, &CallContext::background()).unwrap_err();
    assert!(matches!(err, SnapshotError::Store(StoreError::VersionConflict { .. })));
    assert_eq!(err.class(), ErrorClass::Conflict);
    assert_eq!(harness.audit.count(TrustAuditKind::VersionConflictRetry), 0);
}

/// Seeds root through `update_many` so single-write conflict injection is left untouched.
fn seed_root_via_batch(services: &TrustServices, gun: &Gun) -> Vec<u8> {
    let ctx = CallContext::background();
    let mut role_keys = BTreeMap::new();
    for role in [RoleName::Root, RoleName::Targets, RoleName::Snapshot, RoleName::Timestamp] {
        let key = services.crypto.create(&role, gun, KeyAlgorithm::Ed25519).unwrap();
        role_keys.insert(role, vec![key]);
    }
    let mut repo = services.repo(gun);
    repo.init_root(&role_keys, services.expires_for(&RoleName::Root));
    let root = repo.sign_root(services.expires_for(&RoleName::Root), &ctx).unwrap();
    let update = MetaUpdate::from_signed(RoleName::Root, &root).unwrap();
    let bytes = update.data.clone();
    services.store.update_many(gun, vec![update]).unwrap();
    bytes
}
