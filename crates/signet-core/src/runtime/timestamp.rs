// crates/signet-core/src/runtime/timestamp.rs
// ============================================================================
// Module: Signet Timestamp Manager
// Description: Get-or-create protocol for a namespace's timestamp document.
// Purpose: Keep the timestamp fresh and bound to the current snapshot.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The stored timestamp is reused only while it is unexpired and records the
//! hash of the current snapshot. Otherwise a new timestamp is signed with the
//! timestamp key the current root names, so a rotated timestamp key takes
//! effect at this point rather than retroactively.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::CallContext;
use crate::core::Gun;
use crate::core::MetaUpdate;
use crate::core::RoleName;
use crate::core::SignedTimestamp;
use crate::core::sha256_hex;
use crate::interfaces::MetaStore;
use crate::runtime::audit::TrustAuditEvent;
use crate::runtime::audit::TrustAuditKind;
use crate::runtime::repo::RepoError;
use crate::runtime::services::TrustServices;
use crate::runtime::snapshot::SnapshotError;
use crate::runtime::snapshot::SnapshotManager;

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Timestamp get-or-create protocol.
#[derive(Clone)]
pub struct TimestampManager {
    /// Shared collaborators.
    services: TrustServices,
}

impl TimestampManager {
    /// Creates a manager over `services`.
    #[must_use]
    pub const fn new(services: TrustServices) -> Self {
        Self {
            services,
        }
    }

    /// Returns the current timestamp bytes, regenerating when stale or when
    /// the snapshot has moved on.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::CorruptMetadata`] for undecodable documents,
    /// [`SnapshotError::RootMissing`] when the namespace has no root, and
    /// [`SnapshotError::Repo`] when signing fails.
    pub fn get_or_create_timestamp(&self, gun: &Gun, ctx: &CallContext) -> Result<Vec<u8>, SnapshotError> {
        let snapshots = SnapshotManager::new(self.services.clone());
        self.services.with_retries(gun, ctx, || {
            let snapshot = snapshots.get_or_create_snapshot(gun, ctx)?;
            self.attempt(gun, &snapshot, ctx)
        })
    }

    /// Runs one read-check-regenerate-write pass against `snapshot`.
    fn attempt(&self, gun: &Gun, snapshot: &[u8], ctx: &CallContext) -> Result<Vec<u8>, SnapshotError> {
        let store = &self.services.store;
        let previous = match store.get_current(gun, &RoleName::Timestamp)? {
            Some(bytes) => {
                let decoded = SignedTimestamp::decode(&bytes)
                    .map_err(|err| SnapshotError::corrupt(gun, &RoleName::Timestamp, &err))?;
                let current = decoded.signed.snapshot_meta().is_some_and(|meta| meta.matches(snapshot));
                if current && !decoded.is_expired(self.services.now()) {
                    return Ok(bytes);
                }
                Some(decoded)
            }
            None => None,
        };

        ctx.check()?;
        let root_bytes = store
            .get_current(gun, &RoleName::Root)?
            .ok_or_else(|| SnapshotError::RootMissing {
                gun: gun.clone(),
            })?;
        let mut repo = self.services.repo(gun);
        repo.load_root(&root_bytes).map_err(|err| match err {
            RepoError::Metadata(err) => SnapshotError::corrupt(gun, &RoleName::Root, &err),
            other => SnapshotError::Repo(other),
        })?;
        if let Some(previous) = previous {
            repo.set_timestamp(previous);
        }

        let expires = self.services.expires_for(&RoleName::Timestamp);
        let signed = repo.sign_timestamp(snapshot, expires, ctx)?;
        let update = MetaUpdate::from_signed(RoleName::Timestamp, &signed)?;
        let version = update.version;
        let bytes = update.data.clone();
        ctx.check()?;
        store.update_current(gun, update)?;
        self.services.audit.record(&TrustAuditEvent::document(
            TrustAuditKind::TimestampRegenerated,
            gun,
            RoleName::Timestamp,
            version,
            sha256_hex(&bytes),
        ));
        Ok(bytes)
    }
}
