// crates/signet-core/src/runtime/store.rs
// ============================================================================
// Module: Signet In-Memory Metadata Store
// Description: Versioned in-memory MetaStore for tests and single-node use.
// Purpose: Provide a deterministic store enforcing gap-free version chains.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryMetaStore`] keeps every committed version per `(gun, role)` and
//! appends a [`Change`] whenever a timestamp commits. Writes validate the
//! whole batch before touching state, so a rejected `update_many` leaves the
//! store untouched. [`SharedMetaStore`] wraps any store behind an `Arc`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::Gun;
use crate::core::MetaUpdate;
use crate::core::RoleName;
use crate::core::sha256_hex;
use crate::interfaces::Change;
use crate::interfaces::MetaStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Version Rules
// ============================================================================

/// Checks that `attempted` is the next version after `current`.
///
/// # Errors
///
/// Returns [`StoreError::VersionConflict`] when `attempted` is not newer than
/// `current` and [`StoreError::Invalid`] when it would skip versions.
pub fn check_next_version(
    gun: &Gun,
    role: &RoleName,
    current: u64,
    attempted: u64,
) -> Result<(), StoreError> {
    if attempted <= current {
        return Err(StoreError::VersionConflict {
            gun: gun.clone(),
            role: role.to_string(),
            attempted,
            current,
        });
    }
    if current.checked_add(1) != Some(attempted) {
        return Err(StoreError::Invalid(format!(
            "version gap for {gun}/{role}: current {current}, attempted {attempted}"
        )));
    }
    Ok(())
}

/// Rejects batches that name the same role twice or carry empty documents.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] for duplicate roles or empty payloads.
pub fn check_batch(updates: &[MetaUpdate]) -> Result<(), StoreError> {
    let mut seen = BTreeSet::new();
    for update in updates {
        if update.data.is_empty() {
            return Err(StoreError::Invalid(format!("empty document for role {}", update.role)));
        }
        if !seen.insert(&update.role) {
            return Err(StoreError::Invalid(format!("duplicate role {} in batch", update.role)));
        }
    }
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// One committed document version.
#[derive(Debug, Clone)]
struct StoredVersion {
    /// Document version.
    version: u64,
    /// Document bytes.
    data: Vec<u8>,
    /// SHA-256 of `data`.
    checksum: String,
}

/// Mutable store state.
#[derive(Debug, Default)]
struct MemoryState {
    /// Version history per namespace and role, oldest first.
    documents: BTreeMap<(Gun, RoleName), Vec<StoredVersion>>,
    /// Timestamp change feed.
    changes: Vec<Change>,
    /// Last issued change id.
    last_change_id: u64,
}

impl MemoryState {
    /// Returns the latest committed version for `(gun, role)` or 0.
    fn current_version(&self, gun: &Gun, role: &RoleName) -> u64 {
        self.documents
            .get(&(gun.clone(), role.clone()))
            .and_then(|history| history.last())
            .map_or(0, |stored| stored.version)
    }

    /// Appends a validated update.
    fn apply(&mut self, gun: &Gun, update: MetaUpdate) {
        let checksum = sha256_hex(&update.data);
        if update.role == RoleName::Timestamp {
            self.last_change_id = self.last_change_id.saturating_add(1);
            self.changes.push(Change {
                id: self.last_change_id,
                gun: gun.clone(),
                version: update.version,
                checksum: checksum.clone(),
                recorded_at_ms: unix_millis(),
            });
        }
        self.documents.entry((gun.clone(), update.role)).or_default().push(StoredVersion {
            version: update.version,
            data: update.data,
            checksum,
        });
    }
}

/// In-memory metadata store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMetaStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryMetaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("metadata store mutex poisoned".to_string()))
    }

    /// Returns the first stored version matching `predicate`.
    fn find(
        &self,
        gun: &Gun,
        role: &RoleName,
        predicate: impl Fn(&StoredVersion) -> bool,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .documents
            .get(&(gun.clone(), role.clone()))
            .and_then(|history| history.iter().find(|stored| predicate(stored)))
            .map(|stored| stored.data.clone()))
    }
}

impl MetaStore for InMemoryMetaStore {
    fn get_current(&self, gun: &Gun, role: &RoleName) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .documents
            .get(&(gun.clone(), role.clone()))
            .and_then(|history| history.last())
            .map(|stored| stored.data.clone()))
    }

    fn update_current(&self, gun: &Gun, update: MetaUpdate) -> Result<(), StoreError> {
        self.update_many(gun, vec![update])
    }

    fn update_many(&self, gun: &Gun, updates: Vec<MetaUpdate>) -> Result<(), StoreError> {
        check_batch(&updates)?;
        let mut guard = self.lock()?;
        for update in &updates {
            let current = guard.current_version(gun, &update.role);
            check_next_version(gun, &update.role, current, update.version)?;
        }
        for update in updates {
            guard.apply(gun, update);
        }
        drop(guard);
        Ok(())
    }

    fn get_checksum(
        &self,
        gun: &Gun,
        role: &RoleName,
        checksum: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.find(gun, role, |stored| stored.checksum == checksum)
    }

    fn get_version(
        &self,
        gun: &Gun,
        role: &RoleName,
        version: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.find(gun, role, |stored| stored.version == version)
    }

    fn delete(&self, gun: &Gun) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.documents.retain(|(stored_gun, _), _| stored_gun != gun);
        drop(guard);
        Ok(())
    }

    fn changes(
        &self,
        after: u64,
        limit: usize,
        gun_filter: Option<&Gun>,
    ) -> Result<Vec<Change>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .changes
            .iter()
            .filter(|change| change.id > after)
            .filter(|change| gun_filter.is_none_or(|gun| &change.gun == gun))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared metadata store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedMetaStore {
    /// Inner store implementation.
    inner: Arc<dyn MetaStore + Send + Sync>,
}

impl SharedMetaStore {
    /// Wraps a metadata store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl MetaStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn MetaStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl MetaStore for SharedMetaStore {
    fn get_current(&self, gun: &Gun, role: &RoleName) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_current(gun, role)
    }

    fn update_current(&self, gun: &Gun, update: MetaUpdate) -> Result<(), StoreError> {
        self.inner.update_current(gun, update)
    }

    fn update_many(&self, gun: &Gun, updates: Vec<MetaUpdate>) -> Result<(), StoreError> {
        self.inner.update_many(gun, updates)
    }

    fn get_checksum(
        &self,
        gun: &Gun,
        role: &RoleName,
        checksum: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_checksum(gun, role, checksum)
    }

    fn get_version(
        &self,
        gun: &Gun,
        role: &RoleName,
        version: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_version(gun, role, version)
    }

    fn delete(&self, gun: &Gun) -> Result<(), StoreError> {
        self.inner.delete(gun)
    }

    fn changes(
        &self,
        after: u64,
        limit: usize,
        gun_filter: Option<&Gun>,
    ) -> Result<Vec<Change>, StoreError> {
        self.inner.changes(after, limit, gun_filter)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}
