// crates/signet-core/src/runtime/rotation.rs
// ============================================================================
// Module: Signet Key Rotation
// Description: Replaces the keys bound to a canonical role in root.
// Purpose: Swap signing authority without breaking continuity of trust.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Rotating a role replaces its key list in root, signs root at the next
//! version, and commits root together with a new snapshot. A rotated root is
//! co-signed by the outgoing root keys so clients holding the previous root
//! can follow the change. Rotating `targets` re-signs the targets document
//! with the new key in the same commit.
//!
//! The timestamp is not regenerated here: a rotated timestamp key signs the
//! next timestamp produced by [`crate::runtime::TimestampManager`].
//!
//! Rotating `root` on a namespace without metadata bootstraps it: the first
//! available root key (hardware-backed keys first, then discovery order) or
//! one freshly created key becomes the sole root signer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::CallContext;
use crate::core::Gun;
use crate::core::Interrupted;
use crate::core::KeyId;
use crate::core::MetaUpdate;
use crate::core::MetadataError;
use crate::core::PublicKey;
use crate::core::RoleName;
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
use crate::runtime::repo::TrustRepo;
use crate::runtime::services::ErrorClass;
use crate::runtime::services::LoadError;
use crate::runtime::services::RepoState;
use crate::runtime::services::Retryable;
use crate::runtime::services::TrustServices;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key rotation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotationError {
    /// The namespace has no metadata and the role cannot bootstrap it.
    #[error("namespace {gun} is not initialized")]
    NotInitialized {
        /// Namespace.
        gun: Gun,
    },
    /// The role cannot be rotated this way.
    #[error("cannot rotate {role}: {reason}")]
    InvalidRole {
        /// Role name.
        role: String,
        /// Human-readable reason.
        reason: String,
    },
    /// The new key set cannot meet the threshold.
    #[error("role {role} needs {threshold} keys, rotation supplies {keys}")]
    ThresholdUnsatisfiable {
        /// Role name.
        role: String,
        /// Threshold in force after rotation.
        threshold: u32,
        /// Keys supplied.
        keys: usize,
    },
    /// A candidate key is not held by the crypto service.
    #[error("rotation key not found: {0}")]
    KeyNotFound(KeyId),
    /// The server may only manage snapshot and timestamp keys.
    #[error("role {role} cannot be managed by the server")]
    InvalidRemoteRole {
        /// Role name.
        role: String,
    },
    /// The timestamp key must be managed by the server.
    #[error("role {role} must be managed by the server")]
    InvalidLocalRole {
        /// Role name.
        role: String,
    },
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
    /// The call was cancelled or ran out of time.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl RotationError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotInitialized {
                ..
            }
            | Self::InvalidRole {
                ..
            }
            | Self::ThresholdUnsatisfiable {
                ..
            }
            | Self::InvalidRemoteRole {
                ..
            }
            | Self::InvalidLocalRole {
                ..
            } => ErrorClass::Validation,
            Self::CorruptMetadata {
                ..
            } => ErrorClass::Integrity,
            Self::KeyNotFound(_) | Self::Interrupted(_) => ErrorClass::Availability,
            Self::Crypto(err) => err.class(),
            Self::Store(err) => err.class(),
            Self::Repo(err) => err.class(),
        }
    }
}

impl From<MetadataError> for RotationError {
    fn from(err: MetadataError) -> Self {
        Self::Repo(RepoError::Metadata(err))
    }
}

impl From<LoadError> for RotationError {
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

impl Retryable for RotationError {
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
// SECTION: Role Rules
// ============================================================================

/// Checks which side may hold the key for `role`.
fn check_custody(role: &RoleName, server_manages_key: bool) -> Result<(), RotationError> {
    if role.is_delegation() {
        return Err(RotationError::InvalidRole {
            role: role.to_string(),
            reason: "delegated roles are changed through delegation edits".to_string(),
        });
    }
    let server_role = matches!(role, RoleName::Snapshot | RoleName::Timestamp);
    if server_manages_key && !server_role {
        return Err(RotationError::InvalidRemoteRole {
            role: role.to_string(),
        });
    }
    if !server_manages_key && role == &RoleName::Timestamp {
        return Err(RotationError::InvalidLocalRole {
            role: role.to_string(),
        });
    }
    Ok(())
}

/// Resolves keys once per call so retries never create extra keys.
fn cached_keys<K: Clone>(
    cache: &mut Option<K>,
    resolve: impl FnOnce() -> Result<K, RotationError>,
) -> Result<K, RotationError> {
    if let Some(keys) = cache {
        return Ok(keys.clone());
    }
    let keys = resolve()?;
    *cache = Some(keys.clone());
    Ok(keys)
}

// ============================================================================
// SECTION: Rotation
// ============================================================================

/// Key rotation protocol.
#[derive(Clone)]
pub struct KeyRotation {
    /// Shared collaborators.
    services: TrustServices,
}

impl KeyRotation {
    /// Creates a rotation driver over `services`.
    #[must_use]
    pub const fn new(services: TrustServices) -> Self {
        Self {
            services,
        }
    }

    /// Rotates `role` keeping its current threshold.
    ///
    /// With no `candidates`, one new key is created for the role; otherwise
    /// the candidates, which the crypto service must hold, become the key set.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError`] when the role rules reject the request, a
    /// candidate is missing, the threshold cannot be met, or signing or the
    /// commit fails.
    pub fn rotate_key(
        &self,
        gun: &Gun,
        role: &RoleName,
        server_manages_key: bool,
        candidates: &[KeyId],
        ctx: &CallContext,
    ) -> Result<(), RotationError> {
        self.rotate_key_with_threshold(gun, role, server_manages_key, candidates, None, ctx)
    }

    /// Rotates `role`, optionally setting a new threshold.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`KeyRotation::rotate_key`]; an explicit
    /// threshold above the new key count is
    /// [`RotationError::ThresholdUnsatisfiable`] too.
    pub fn rotate_key_with_threshold(
        &self,
        gun: &Gun,
        role: &RoleName,
        server_manages_key: bool,
        candidates: &[KeyId],
        threshold: Option<u32>,
        ctx: &CallContext,
    ) -> Result<(), RotationError> {
        if role.is_delegation() {
            return check_custody(role, server_manages_key);
        }
        let mut keys: Option<Vec<PublicKey>> = None;
        let mut initial_keys: Option<BTreeMap<RoleName, Vec<PublicKey>>> = None;
        self.services.with_retries(gun, ctx, || -> Result<(), RotationError> {
            match self.services.load_repo(gun)? {
                RepoState::NotInitialized if role == &RoleName::Root => {
                    let root_keys = cached_keys(&mut keys, || self.bootstrap_keys(gun, candidates))?;
                    let role_keys = cached_keys(&mut initial_keys, || {
                        initial_role_keys(&self.services, gun, &root_keys, ctx)
                    })?;
                    self.bootstrap(gun, &role_keys, ctx)
                }
                RepoState::NotInitialized => Err(RotationError::NotInitialized {
                    gun: gun.clone(),
                }),
                RepoState::Initialized(repo) => {
                    check_custody(role, server_manages_key)?;
                    let new_keys =
                        cached_keys(&mut keys, || self.rotation_keys(gun, role, candidates))?;
                    self.rotate_existing(repo, role, &new_keys, threshold, ctx)
                }
            }
        })
    }

    /// Picks the initial root signer.
    fn bootstrap_keys(&self, gun: &Gun, candidates: &[KeyId]) -> Result<Vec<PublicKey>, RotationError> {
        let crypto = &self.services.crypto;
        if !candidates.is_empty() {
            return self.resolve(candidates);
        }
        let available = crypto.list_keys(&RoleName::Root)?;
        let selected =
            available.iter().find(|key_id| crypto.is_hardware_backed(key_id)).or_else(|| available.first());
        let key = match selected {
            Some(key_id) => {
                crypto.get_key(key_id)?.ok_or_else(|| RotationError::KeyNotFound(key_id.clone()))?
            }
            None => crypto.create(&RoleName::Root, gun, self.services.settings.default_algorithm)?,
        };
        Ok(vec![key])
    }

    /// Resolves candidates, or creates one fresh key for `role`.
    fn rotation_keys(
        &self,
        gun: &Gun,
        role: &RoleName,
        candidates: &[KeyId],
    ) -> Result<Vec<PublicKey>, RotationError> {
        if candidates.is_empty() {
            let key = self.services.crypto.create(role, gun, self.services.settings.default_algorithm)?;
            return Ok(vec![key]);
        }
        self.resolve(candidates)
    }

    /// Looks up every candidate in the crypto service.
    fn resolve(&self, candidates: &[KeyId]) -> Result<Vec<PublicKey>, RotationError> {
        candidates
            .iter()
            .map(|key_id| {
                self.services
                    .crypto
                    .get_key(key_id)?
                    .ok_or_else(|| RotationError::KeyNotFound(key_id.clone()))
            })
            .collect()
    }

    /// Signs and commits the first document set of a namespace.
    fn bootstrap(
        &self,
        gun: &Gun,
        role_keys: &BTreeMap<RoleName, Vec<PublicKey>>,
        ctx: &CallContext,
    ) -> Result<(), RotationError> {
        let updates: Vec<MetaUpdate> = initial_documents::<RotationError>(&self.services, gun, role_keys, ctx)?;
        let root_keys = role_keys.get(&RoleName::Root).map_or(&[][..], Vec::as_slice);
        let version = updates.first().map(|update| update.version);
        ctx.check()?;
        self.services.store.update_many(gun, updates)?;
        self.services.audit.record(&TrustAuditEvent::new(TrustAuditEventParams {
            kind: TrustAuditKind::RootBootstrapped,
            gun,
            roles: vec![RoleName::Root],
            version,
            key_ids: root_keys.iter().map(PublicKey::id).collect(),
            checksum: None,
            attempt: None,
        }));
        Ok(())
    }

    /// Replaces the keys of `role` in an initialized namespace and commits.
    fn rotate_existing(
        &self,
        mut repo: TrustRepo<'_>,
        role: &RoleName,
        keys: &[PublicKey],
        threshold: Option<u32>,
        ctx: &CallContext,
    ) -> Result<(), RotationError> {
        let current = repo.root_role(role)?;
        let threshold = threshold.unwrap_or(current.threshold);
        if threshold == 0 {
            return Err(RotationError::InvalidRole {
                role: role.to_string(),
                reason: "threshold must be at least 1".to_string(),
            });
        }
        if !usize::try_from(threshold).is_ok_and(|needed| needed <= keys.len()) {
            return Err(RotationError::ThresholdUnsatisfiable {
                role: role.to_string(),
                threshold,
                keys: keys.len(),
            });
        }

        repo.replace_role_keys(role, keys, threshold)?;
        let root = repo.sign_root(self.services.expires_for(&RoleName::Root), ctx)?;
        let mut updates = vec![MetaUpdate::from_signed(RoleName::Root, &root)?];
        if role == &RoleName::Targets && repo.targets(&RoleName::Targets).is_some() {
            let targets = repo.sign_targets(&RoleName::Targets, self.services.expires_for(role), ctx)?;
            updates.push(MetaUpdate::from_signed(RoleName::Targets, &targets)?);
        }
        let snapshot = repo.sign_snapshot(self.services.expires_for(&RoleName::Snapshot), ctx)?;
        updates.push(MetaUpdate::from_signed(RoleName::Snapshot, &snapshot)?);

        ctx.check()?;
        let gun = repo.gun().clone();
        self.services.store.update_many(&gun, updates)?;
        self.services.audit.record(&TrustAuditEvent::new(TrustAuditEventParams {
            kind: TrustAuditKind::KeyRotated,
            gun: &gun,
            roles: vec![role.clone()],
            version: Some(root.signed.version),
            key_ids: keys.iter().map(PublicKey::id).collect(),
            checksum: None,
            attempt: None,
        }));
        Ok(())
    }
}
