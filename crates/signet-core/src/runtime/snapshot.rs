// crates/signet-core/src/runtime/snapshot.rs
// ============================================================================
// Module: Signet Snapshot Manager
// Description: Get-or-create protocol for a namespace's snapshot document.
// Purpose: Serve cached snapshots and regenerate stale ones exactly once.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! [`SnapshotManager::get_or_create_snapshot`] returns the stored snapshot
//! bytes unchanged while they are unexpired. A missing or expired snapshot is
//! rebuilt from the current root: the version advances by one, expiry is reset
//! from the expiry policy, and the store write happens last. A snapshot that
//! does not decode is reported as corrupt and never regenerated over.
//!
//! Regeneration keeps the set of listed roles; only the root entry, version,
//! and expiry change. The first snapshot of a namespace also records the
//! current `targets` document.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CallContext;
use crate::core::Gun;
use crate::core::Interrupted;
use crate::core::MetaUpdate;
use crate::core::MetadataError;
use crate::core::RoleName;
use crate::core::SignedSnapshot;
use crate::core::sha256_hex;
use crate::interfaces::MetaStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::TrustAuditEvent;
use crate::runtime::audit::TrustAuditKind;
use crate::runtime::repo::RepoError;
use crate::runtime::services::ErrorClass;
use crate::runtime::services::LoadError;
use crate::runtime::services::Retryable;
use crate::runtime::services::TrustServices;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors from the snapshot and timestamp get-or-create protocols.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// A stored document does not decode.
    #[error("corrupt {role} metadata for {gun}: {reason}")]
    CorruptMetadata {
        /// Namespace.
        gun: Gun,
        /// Role whose document is corrupt.
        role: String,
        /// Decoder message.
        reason: String,
    },
    /// The namespace has no root, so no signer can be resolved.
    #[error("no root metadata for {gun}")]
    RootMissing {
        /// Namespace.
        gun: Gun,
    },
    /// The metadata store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Signing or document assembly failed.
    #[error(transparent)]
    Repo(#[from] RepoError),
    /// The call was cancelled or ran out of time.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl SnapshotError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::CorruptMetadata {
                ..
            } => ErrorClass::Integrity,
            Self::RootMissing {
                ..
            } => ErrorClass::Validation,
            Self::Store(err) => err.class(),
            Self::Repo(err) => err.class(),
            Self::Interrupted(_) => ErrorClass::Availability,
        }
    }

    /// Builds a corruption error for `role`.
    pub(crate) fn corrupt(gun: &Gun, role: &RoleName, err: &MetadataError) -> Self {
        Self::CorruptMetadata {
            gun: gun.clone(),
            role: role.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<MetadataError> for SnapshotError {
    fn from(err: MetadataError) -> Self {
        Self::Repo(RepoError::Metadata(err))
    }
}

impl From<LoadError> for SnapshotError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Corrupt {
                gun,
                role,
                reason,
            } => Self::CorruptMetadata {
                gun,
                role,
                reason,
            },
            LoadError::Store(err) => Self::Store(err),
        }
    }
}

impl Retryable for SnapshotError {
    fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::VersionConflict {
                ..
            })
        )
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Snapshot get-or-create protocol.
#[derive(Clone)]
pub struct SnapshotManager {
    /// Shared collaborators.
    services: TrustServices,
}

impl SnapshotManager {
    /// Creates a manager over `services`.
    #[must_use]
    pub const fn new(services: TrustServices) -> Self {
        Self {
            services,
        }
    }

    /// Returns the current snapshot bytes, regenerating a missing or expired one.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::CorruptMetadata`] when the stored snapshot or
    /// root does not decode, [`SnapshotError::RootMissing`] when the namespace
    /// has no root, and [`SnapshotError::Repo`] when signing fails.
    pub fn get_or_create_snapshot(&self, gun: &Gun, ctx: &CallContext) -> Result<Vec<u8>, SnapshotError> {
        self.services.with_retries(gun, ctx, || self.attempt(gun, ctx))
    }

    /// Runs one read-check-regenerate-write pass.
    fn attempt(&self, gun: &Gun, ctx: &CallContext) -> Result<Vec<u8>, SnapshotError> {
        let store = &self.services.store;
        let previous = match store.get_current(gun, &RoleName::Snapshot)? {
            Some(bytes) => {
                let decoded = SignedSnapshot::decode(&bytes)
                    .map_err(|err| SnapshotError::corrupt(gun, &RoleName::Snapshot, &err))?;
                if !decoded.is_expired(self.services.now()) {
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
        match previous {
            Some(previous) => repo.set_snapshot(previous),
            None => {
                if let Some(bytes) = store.get_current(gun, &RoleName::Targets)? {
                    repo.load_targets(RoleName::Targets, &bytes).map_err(|err| match err {
                        RepoError::Metadata(err) => {
                            SnapshotError::corrupt(gun, &RoleName::Targets, &err)
                        }
                        other => SnapshotError::Repo(other),
                    })?;
                }
                repo.init_snapshot()?;
            }
        }

        let expires = self.services.expires_for(&RoleName::Snapshot);
        let signed = repo.sign_snapshot(expires, ctx)?;
        let update = MetaUpdate::from_signed(RoleName::Snapshot, &signed)?;
        let version = update.version;
        let bytes = update.data.clone();
        ctx.check()?;
        store.update_current(gun, update)?;
        self.services.audit.record(&TrustAuditEvent::document(
            TrustAuditKind::SnapshotRegenerated,
            gun,
            RoleName::Snapshot,
            version,
            sha256_hex(&bytes),
        ));
        Ok(bytes)
    }
}
