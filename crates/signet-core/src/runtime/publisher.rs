// crates/signet-core/src/runtime/publisher.rs
// ============================================================================
// Module: Signet Publisher
// Description: Publish-time API over targets, delegations, and witnesses.
// Purpose: Apply edits to a namespace and commit re-signed documents atomically.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Every mutating call loads the namespace into a fresh [`TrustRepo`],
//! applies one edit, re-signs the targets-like documents the edit touched,
//! signs a snapshot recording their new file meta plus a matching timestamp,
//! and commits everything with one `update_many`. A version conflict re-runs
//! the whole sequence from a fresh read.
//!
//! Witnessing queues roles for re-signature without editing them; the next
//! [`Publisher::publish`] bumps and re-signs them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;

use crate::core::CallContext;
use crate::core::FileMeta;
use crate::core::Gun;
use crate::core::Interrupted;
use crate::core::KeyId;
use crate::core::MetaUpdate;
use crate::core::MetadataError;
use crate::core::PublicKey;
use crate::core::Role;
use crate::core::RoleName;
use crate::core::sha256_hex;
use crate::interfaces::CryptoError;
use crate::interfaces::CryptoService;
use crate::interfaces::MetaStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::TrustAuditEvent;
use crate::runtime::audit::TrustAuditEventParams;
use crate::runtime::audit::TrustAuditKind;
use crate::runtime::bootstrap::initial_documents;
use crate::runtime::bootstrap::initial_role_keys;
use crate::runtime::repo::RepoError;
use crate::runtime::repo::TargetEntry;
use crate::runtime::repo::TrustRepo;
use crate::runtime::rotation::KeyRotation;
use crate::runtime::rotation::RotationError;
use crate::runtime::services::ErrorClass;
use crate::runtime::services::LoadError;
use crate::runtime::services::RepoState;
use crate::runtime::services::Retryable;
use crate::runtime::services::TrustServices;
use crate::runtime::snapshot::SnapshotError;
use crate::runtime::snapshot::SnapshotManager;
use crate::runtime::timestamp::TimestampManager;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Publish-time errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The namespace has no metadata.
    #[error("namespace {gun} is not initialized")]
    NotInitialized {
        /// Namespace.
        gun: Gun,
    },
    /// The namespace already has a root.
    #[error("namespace {gun} is already initialized")]
    AlreadyInitialized {
        /// Namespace.
        gun: Gun,
    },
    /// The server may only manage snapshot and timestamp keys.
    #[error("role {role} cannot be managed by the server")]
    InvalidRemoteRole {
        /// Role name.
        role: String,
    },
    /// A root key id is not held by the crypto service.
    #[error("root key not found: {0}")]
    KeyNotFound(KeyId),
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
    /// The crypto service failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The metadata store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Editing or signing the working set failed.
    #[error(transparent)]
    Repo(#[from] RepoError),
    /// Key rotation failed.
    #[error(transparent)]
    Rotation(#[from] RotationError),
    /// Snapshot or timestamp get-or-create failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// The call was cancelled or ran out of time.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl PublishError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotInitialized {
                ..
            }
            | Self::AlreadyInitialized {
                ..
            }
            | Self::InvalidRemoteRole {
                ..
            } => ErrorClass::Validation,
            Self::CorruptMetadata {
                ..
            } => ErrorClass::Integrity,
            Self::KeyNotFound(_) | Self::Interrupted(_) => ErrorClass::Availability,
            Self::Crypto(err) => err.class(),
            Self::Store(err) => err.class(),
            Self::Repo(err) => err.class(),
            Self::Rotation(err) => err.class(),
            Self::Snapshot(err) => err.class(),
        }
    }
}

impl From<MetadataError> for PublishError {
    fn from(err: MetadataError) -> Self {
        Self::Repo(RepoError::Metadata(err))
    }
}

impl From<LoadError> for PublishError {
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

impl Retryable for PublishError {
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
// SECTION: Publisher
// ============================================================================

/// Publish-time API for namespaces held in one metadata store.
pub struct Publisher {
    /// Shared collaborators.
    services: TrustServices,
    /// Witnessed roles awaiting the next publish, per namespace.
    witnessed: Mutex<BTreeMap<Gun, BTreeSet<RoleName>>>,
}

impl Publisher {
    /// Creates a publisher over `services`.
    #[must_use]
    pub fn new(services: TrustServices) -> Self {
        Self {
            services,
            witnessed: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub const fn services(&self) -> &TrustServices {
        &self.services
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    /// Creates version 1 of every canonical document for a new namespace.
    ///
    /// `root_key_ids` must be held by the crypto service; when empty, one
    /// root key is created. Keys for the other canonical roles are created
    /// in the crypto service. `server_managed_roles` may name only
    /// `snapshot` and `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::AlreadyInitialized`] when the namespace has a
    /// root, [`PublishError::InvalidRemoteRole`] for a disallowed
    /// server-managed role, and [`PublishError::KeyNotFound`] for unknown
    /// root keys.
    pub fn initialize(
        &self,
        gun: &Gun,
        root_key_ids: &[KeyId],
        server_managed_roles: &[RoleName],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        if let Some(role) = server_managed_roles
            .iter()
            .find(|role| !matches!(role, RoleName::Snapshot | RoleName::Timestamp))
        {
            return Err(PublishError::InvalidRemoteRole {
                role: role.to_string(),
            });
        }
        if self.services.store.get_current(gun, &RoleName::Root)?.is_some() {
            return Err(PublishError::AlreadyInitialized {
                gun: gun.clone(),
            });
        }
        let crypto = &self.services.crypto;
        let root_keys = if root_key_ids.is_empty() {
            vec![crypto.create(&RoleName::Root, gun, self.services.settings.default_algorithm)?]
        } else {
            root_key_ids
                .iter()
                .map(|key_id| crypto.get_key(key_id)?.ok_or_else(|| PublishError::KeyNotFound(key_id.clone())))
                .collect::<Result<Vec<PublicKey>, PublishError>>()?
        };
        let role_keys = initial_role_keys::<PublishError>(&self.services, gun, &root_keys, ctx)?;
        let updates = initial_documents::<PublishError>(&self.services, gun, &role_keys, ctx)?;
        ctx.check()?;
        let roles: Vec<RoleName> = updates.iter().map(|update| update.role.clone()).collect();
        self.services.store.update_many(gun, updates).map_err(|err| match err {
            StoreError::VersionConflict {
                gun, ..
            } => PublishError::AlreadyInitialized {
                gun,
            },
            other => PublishError::Store(other),
        })?;
        self.services.audit.record(&TrustAuditEvent::new(TrustAuditEventParams {
            kind: TrustAuditKind::RootBootstrapped,
            gun,
            roles,
            version: Some(1),
            key_ids: root_keys.iter().map(PublicKey::id).collect(),
            checksum: None,
            attempt: None,
        }));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------------

    /// Adds or replaces a target in `role` and publishes.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Repo`] when the name is invalid or outside the
    /// role's effective paths, plus load, signing, and store errors.
    pub fn add_target(
        &self,
        gun: &Gun,
        role: &RoleName,
        name: &str,
        meta: &FileMeta,
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.add_target(role, name, meta.clone())?))
    }

    /// Removes a target from `role` and publishes; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Repo`] when the role has no document, plus
    /// load, signing, and store errors.
    pub fn remove_target(
        &self,
        gun: &Gun,
        role: &RoleName,
        name: &str,
        ctx: &CallContext,
    ) -> Result<bool, PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.remove_target(role, name)?))
    }

    /// Lists targets reachable from `roles` (all of `targets` when empty).
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NotInitialized`] for unknown namespaces and
    /// [`PublishError::Repo`] for unknown start roles.
    pub fn list_targets(&self, gun: &Gun, roles: &[RoleName]) -> Result<Vec<TargetEntry>, PublishError> {
        self.read(gun, |repo| Ok(repo.list_targets(roles)?))
    }

    /// Returns the highest-priority listing of `name`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::list_targets`].
    pub fn get_target_by_name(
        &self,
        gun: &Gun,
        name: &str,
        roles: &[RoleName],
    ) -> Result<Option<TargetEntry>, PublishError> {
        self.read(gun, |repo| Ok(repo.get_target_by_name(name, roles)?))
    }

    /// Returns every delegated role reachable from `targets`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NotInitialized`] for unknown namespaces.
    pub fn delegation_roles(&self, gun: &Gun) -> Result<Vec<Role>, PublishError> {
        self.read(gun, |repo| Ok(repo.delegation_roles()?))
    }

    // ------------------------------------------------------------------------
    // Delegations
    // ------------------------------------------------------------------------

    /// Adds keys and paths to a delegation, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Repo`] for invalid names or paths, plus load,
    /// signing, and store errors.
    pub fn add_delegation(
        &self,
        gun: &Gun,
        name: &RoleName,
        keys: &[PublicKey],
        paths: &[String],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.add_delegation(name, keys, paths)?))
    }

    /// Adds keys to a delegation, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::add_delegation`].
    pub fn add_delegation_role_and_keys(
        &self,
        gun: &Gun,
        name: &RoleName,
        keys: &[PublicKey],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.add_delegation_role_and_keys(name, keys)?))
    }

    /// Adds path grants to a delegation, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::add_delegation`].
    pub fn add_delegation_paths(
        &self,
        gun: &Gun,
        name: &RoleName,
        paths: &[String],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.add_delegation_paths(name, paths)?))
    }

    /// Removes keys and paths from an existing delegation.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Repo`] when the delegation does not exist,
    /// plus load, signing, and store errors.
    pub fn remove_delegation_keys_and_paths(
        &self,
        gun: &Gun,
        name: &RoleName,
        key_ids: &[KeyId],
        paths: &[String],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.remove_delegation_keys_and_paths(name, key_ids, paths)?))
    }

    /// Removes a delegation from its parent.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::remove_delegation_keys_and_paths`].
    pub fn remove_delegation_role(&self, gun: &Gun, name: &RoleName, ctx: &CallContext) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.remove_delegation_role(name)?))
    }

    /// Removes path grants from an existing delegation.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::remove_delegation_keys_and_paths`].
    pub fn remove_delegation_paths(
        &self,
        gun: &Gun,
        name: &RoleName,
        paths: &[String],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.remove_delegation_paths(name, paths)?))
    }

    /// Removes keys from an existing delegation.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::remove_delegation_keys_and_paths`].
    pub fn remove_delegation_keys(
        &self,
        gun: &Gun,
        name: &RoleName,
        key_ids: &[KeyId],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.remove_delegation_keys(name, key_ids)?))
    }

    /// Empties a delegation's path grants, keeping the role and its keys.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Publisher::remove_delegation_keys_and_paths`].
    pub fn clear_delegation_paths(&self, gun: &Gun, name: &RoleName, ctx: &CallContext) -> Result<(), PublishError> {
        self.apply(gun, ctx, |repo| Ok(repo.clear_delegation_paths(name)?))
    }

    // ------------------------------------------------------------------------
    // Witness and Publish
    // ------------------------------------------------------------------------

    /// Queues targets-like roles for re-signature at the next publish.
    /// Returns the roles accepted; roles without a stored document are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NotInitialized`] for unknown namespaces.
    pub fn witness(&self, gun: &Gun, roles: &[RoleName]) -> Result<Vec<RoleName>, PublishError> {
        let accepted: Vec<RoleName> = self.read(gun, |repo| {
            Ok(roles
                .iter()
                .filter(|role| role.is_targets_role() && repo.targets(role).is_some())
                .cloned()
                .collect())
        })?;
        if accepted.is_empty() {
            return Ok(accepted);
        }
        self.lock_witnessed()?.entry(gun.clone()).or_default().extend(accepted.iter().cloned());
        self.services.audit.record(&TrustAuditEvent::new(TrustAuditEventParams {
            kind: TrustAuditKind::RolesWitnessed,
            gun,
            roles: accepted.clone(),
            version: None,
            key_ids: Vec::new(),
            checksum: None,
            attempt: None,
        }));
        Ok(accepted)
    }

    /// Re-signs every witnessed role of `gun` and commits; returns the roles
    /// that were re-signed. The queue is cleared only after a commit.
    ///
    /// # Errors
    ///
    /// Returns load, signing, and store errors; witnessed roles stay queued.
    pub fn publish(&self, gun: &Gun, ctx: &CallContext) -> Result<Vec<RoleName>, PublishError> {
        let pending: Vec<RoleName> = self
            .lock_witnessed()?
            .get(gun)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let published = self.apply(gun, ctx, |repo| {
            Ok(pending.iter().filter(|role| repo.mark_dirty(role)).cloned().collect::<Vec<RoleName>>())
        })?;
        let mut witnessed = self.lock_witnessed()?;
        if let Some(queued) = witnessed.get_mut(gun) {
            for role in &pending {
                queued.remove(role);
            }
            if queued.is_empty() {
                witnessed.remove(gun);
            }
        }
        drop(witnessed);
        Ok(published)
    }

    // ------------------------------------------------------------------------
    // Rotation and Freshness
    // ------------------------------------------------------------------------

    /// Rotates the keys of a canonical role.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Rotation`] with the rotation failure.
    pub fn rotate_key(
        &self,
        gun: &Gun,
        role: &RoleName,
        server_manages_key: bool,
        candidates: &[KeyId],
        ctx: &CallContext,
    ) -> Result<(), PublishError> {
        KeyRotation::new(self.services.clone()).rotate_key(gun, role, server_manages_key, candidates, ctx)?;
        Ok(())
    }

    /// Returns the current snapshot bytes, regenerating when needed.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Snapshot`] with the snapshot failure.
    pub fn get_or_create_snapshot(&self, gun: &Gun, ctx: &CallContext) -> Result<Vec<u8>, PublishError> {
        Ok(SnapshotManager::new(self.services.clone()).get_or_create_snapshot(gun, ctx)?)
    }

    /// Returns the current timestamp bytes, regenerating when needed.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Snapshot`] with the timestamp failure.
    pub fn get_or_create_timestamp(&self, gun: &Gun, ctx: &CallContext) -> Result<Vec<u8>, PublishError> {
        Ok(TimestampManager::new(self.services.clone()).get_or_create_timestamp(gun, ctx)?)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Locks the witness queue.
    fn lock_witnessed(&self) -> Result<MutexGuard<'_, BTreeMap<Gun, BTreeSet<RoleName>>>, PublishError> {
        self.witnessed
            .lock()
            .map_err(|_| PublishError::Store(StoreError::Store("witness queue mutex poisoned".to_string())))
    }

    /// Loads `gun` and runs a read-only query against it.
    fn read<T>(
        &self,
        gun: &Gun,
        query: impl FnOnce(&TrustRepo<'_>) -> Result<T, PublishError>,
    ) -> Result<T, PublishError> {
        match self.services.load_repo(gun)? {
            RepoState::Initialized(repo) => query(&repo),
            RepoState::NotInitialized => Err(PublishError::NotInitialized {
                gun: gun.clone(),
            }),
        }
    }

    /// Loads `gun`, applies `edit`, and commits the result, retrying the
    /// whole sequence on version conflicts.
    fn apply<T>(
        &self,
        gun: &Gun,
        ctx: &CallContext,
        mut edit: impl FnMut(&mut TrustRepo<'_>) -> Result<T, PublishError>,
    ) -> Result<T, PublishError> {
        self.services.with_retries(gun, ctx, || -> Result<T, PublishError> {
            let mut repo = match self.services.load_repo(gun)? {
                RepoState::Initialized(repo) => repo,
                RepoState::NotInitialized => {
                    return Err(PublishError::NotInitialized {
                        gun: gun.clone(),
                    });
                }
            };
            let value = edit(&mut repo)?;
            self.commit(&mut repo, ctx)?;
            Ok(value)
        })
    }

    /// Re-signs dirty targets-like roles, then snapshot and timestamp, and
    /// writes them in one batch. Does nothing when no document changed.
    fn commit(&self, repo: &mut TrustRepo<'_>, ctx: &CallContext) -> Result<(), PublishError> {
        let dirty = repo.dirty_targets();
        if dirty.is_empty() && repo.removed_roles().is_empty() {
            return Ok(());
        }
        let mut updates = Vec::with_capacity(dirty.len().saturating_add(2));
        for role in &dirty {
            let signed = repo.sign_targets(role, self.services.expires_for(role), ctx)?;
            updates.push(MetaUpdate::from_signed(role.clone(), &signed)?);
        }
        let snapshot = repo.sign_snapshot(self.services.expires_for(&RoleName::Snapshot), ctx)?;
        let snapshot_update = MetaUpdate::from_signed(RoleName::Snapshot, &snapshot)?;
        let timestamp =
            repo.sign_timestamp(&snapshot_update.data, self.services.expires_for(&RoleName::Timestamp), ctx)?;
        let checksum = sha256_hex(&snapshot_update.data);
        updates.push(snapshot_update);
        updates.push(MetaUpdate::from_signed(RoleName::Timestamp, &timestamp)?);

        ctx.check()?;
        let roles: Vec<RoleName> = updates.iter().map(|update| update.role.clone()).collect();
        self.services.store.update_many(repo.gun(), updates)?;
        self.services.audit.record(&TrustAuditEvent::new(TrustAuditEventParams {
            kind: TrustAuditKind::MetadataPublished,
            gun: repo.gun(),
            roles,
            version: Some(snapshot.signed.version),
            key_ids: Vec::new(),
            checksum: Some(checksum),
            attempt: None,
        }));
        Ok(())
    }
}
