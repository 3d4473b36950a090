// crates/signet-core/src/runtime/repo.rs
// ============================================================================
// Module: Signet Trust Repository
// Description: In-memory working set of one namespace's signed documents.
// Purpose: Apply role, target, and delegation edits and re-sign documents.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! A [`TrustRepo`] holds the current root, the loaded targets tree, and the
//! last snapshot and timestamp of one namespace. Edits mark documents dirty;
//! `sign_*` calls bump versions by exactly one, set expiries, and collect
//! signatures from the injected [`CryptoService`]. Every freshly signed
//! document is re-verified against the role that must accept it.
//!
//! Signing builds the new document off to the side and only replaces the
//! working copy after signatures verify, so a failed signing attempt leaves
//! the working set unchanged.
//!
//! Security posture: `set_root` and `load_root` trust their input; use
//! [`TrustRepo::bootstrap_root`] for roots fetched from an untrusted channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::core::BaseRole;
use crate::core::CallContext;
use crate::core::DelegationRole;
use crate::core::Document;
use crate::core::FileMeta;
use crate::core::Gun;
use crate::core::KeyId;
use crate::core::MetadataError;
use crate::core::PublicKey;
use crate::core::Role;
use crate::core::RoleError;
use crate::core::RoleName;
use crate::core::RootMeta;
use crate::core::Signature;
use crate::core::Signed;
use crate::core::SignedRoot;
use crate::core::SignedSnapshot;
use crate::core::SignedTargets;
use crate::core::SignedTimestamp;
use crate::core::SnapshotMeta;
use crate::core::TargetsMeta;
use crate::core::Timestamp;
use crate::core::TimestampMeta;
use crate::core::VerifyError;
use crate::core::verify_signed;
use crate::interfaces::CryptoError;
use crate::interfaces::CryptoService;
use crate::interfaces::SignError;
use crate::interfaces::TrustPinError;
use crate::interfaces::TrustPinning;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Threshold given to delegated roles created by delegation edits.
pub const DEFAULT_DELEGATION_THRESHOLD: u32 = 1;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trust repository errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    /// No root has been loaded into the working set.
    #[error("no root loaded")]
    NoRootLoaded,
    /// A role or its document is not part of the working set.
    #[error("role not found: {0}")]
    RoleNotFound(String),
    /// Target name is not acceptable.
    #[error("invalid target {target}: {reason}")]
    InvalidTarget {
        /// Target name.
        target: String,
        /// Human-readable reason.
        reason: String,
    },
    /// Target falls outside the delegated role's effective path grants.
    #[error("target {target} is outside the paths delegated to {role}")]
    TargetOutsidePaths {
        /// Role the target was added to.
        role: String,
        /// Target name.
        target: String,
    },
    /// Role validation failed.
    #[error(transparent)]
    Role(#[from] RoleError),
    /// Metadata encoding or structure failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// Signing failed.
    #[error(transparent)]
    Sign(#[from] SignError),
    /// Signature verification failed.
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// The trust pinning policy rejected a root.
    #[error(transparent)]
    TrustPin(#[from] TrustPinError),
}

// ============================================================================
// SECTION: Target Listing
// ============================================================================

/// One target together with the role that signs for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    /// Target name.
    pub name: String,
    /// Target file meta.
    pub meta: FileMeta,
    /// Role whose document lists the target.
    pub role: RoleName,
}

// ============================================================================
// SECTION: Trust Repository
// ============================================================================

/// In-memory working set for one namespace.
pub struct TrustRepo<'a> {
    /// Namespace.
    gun: Gun,
    /// Key custody backend.
    crypto: &'a dyn CryptoService,
    /// Bound applied to each signing pass.
    signing_timeout: Option<Duration>,
    /// Working root.
    root: Option<SignedRoot>,
    /// File meta of the root bytes as stored, when known.
    root_file: Option<FileMeta>,
    /// Whether root has unsigned edits.
    root_dirty: bool,
    /// Root roles superseded since the last root signature.
    previous_root_roles: Vec<BaseRole>,
    /// Loaded targets-like documents.
    targets: BTreeMap<RoleName, SignedTargets>,
    /// File meta of targets-like documents as stored or last signed.
    target_files: BTreeMap<RoleName, FileMeta>,
    /// Targets-like roles with unsigned edits.
    dirty_targets: BTreeSet<RoleName>,
    /// Delegated roles removed from their parent in this working set.
    removed_roles: BTreeSet<RoleName>,
    /// Working snapshot.
    snapshot: Option<SignedSnapshot>,
    /// Working timestamp.
    timestamp: Option<SignedTimestamp>,
}

impl<'a> TrustRepo<'a> {
    /// Creates an empty working set for `gun`.
    #[must_use]
    pub fn new(gun: Gun, crypto: &'a dyn CryptoService) -> Self {
        Self {
            gun,
            crypto,
            signing_timeout: None,
            root: None,
            root_file: None,
            root_dirty: false,
            previous_root_roles: Vec::new(),
            targets: BTreeMap::new(),
            target_files: BTreeMap::new(),
            dirty_targets: BTreeSet::new(),
            removed_roles: BTreeSet::new(),
            snapshot: None,
            timestamp: None,
        }
    }

    /// Bounds every signing pass by `timeout`.
    #[must_use]
    pub const fn with_signing_timeout(mut self, timeout: Duration) -> Self {
        self.signing_timeout = Some(timeout);
        self
    }

    /// Returns the namespace.
    #[must_use]
    pub const fn gun(&self) -> &Gun {
        &self.gun
    }

    // ------------------------------------------------------------------------
    // Root
    // ------------------------------------------------------------------------

    /// Replaces the working root. No trust validation is performed.
    pub fn set_root(&mut self, root: SignedRoot) {
        self.root = Some(root);
        self.root_file = None;
        self.root_dirty = false;
        self.previous_root_roles.clear();
    }

    /// Decodes stored root bytes and records their exact file meta.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Metadata`] when the bytes are not a root document.
    pub fn load_root(&mut self, bytes: &[u8]) -> Result<(), RepoError> {
        let root = SignedRoot::decode(bytes)?;
        self.set_root(root);
        self.root_file = Some(FileMeta::from_bytes(bytes));
        Ok(())
    }

    /// Accepts a root fetched from an untrusted channel: the pinning policy
    /// runs first, then the root must verify against its own root role.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::TrustPin`] when pinning rejects the root,
    /// [`RepoError::Verify`] when self-signatures fall short, and
    /// [`RepoError::Metadata`] for undecodable bytes.
    pub fn bootstrap_root(&mut self, bytes: &[u8], pinning: &dyn TrustPinning) -> Result<(), RepoError> {
        let mut root = SignedRoot::decode(bytes)?;
        pinning.check_root(&self.gun, &root)?;
        let role = root.signed.base_role(&RoleName::Root)?;
        verify_signed(&mut root, &role)?;
        self.set_root(root);
        self.root_file = Some(FileMeta::from_bytes(bytes));
        Ok(())
    }

    /// Starts a fresh, unsigned version-0 root binding each role to `role_keys`.
    pub fn init_root(&mut self, role_keys: &BTreeMap<RoleName, Vec<PublicKey>>, expires: Timestamp) {
        self.set_root(Signed::unsigned(RootMeta::new(expires, role_keys)));
        self.root_dirty = true;
    }

    /// Returns the working root.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoRootLoaded`] when no root is loaded.
    pub fn root(&self) -> Result<&SignedRoot, RepoError> {
        self.root.as_ref().ok_or(RepoError::NoRootLoaded)
    }

    /// Resolves a canonical role from the working root.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoRootLoaded`] or [`RepoError::Metadata`] when
    /// the role cannot be resolved.
    pub fn root_role(&self, role: &RoleName) -> Result<BaseRole, RepoError> {
        Ok(self.root()?.signed.base_role(role)?)
    }

    /// Returns true when root has unsigned edits.
    #[must_use]
    pub const fn is_root_dirty(&self) -> bool {
        self.root_dirty
    }

    /// Binds `keys` with `threshold` to a canonical role in the working root.
    /// Replacing root keys keeps the outgoing root role as a co-signer of the
    /// next root signature.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoRootLoaded`] without a root and
    /// [`RepoError::Role`] for delegated roles.
    pub fn replace_role_keys(
        &mut self,
        role: &RoleName,
        keys: &[PublicKey],
        threshold: u32,
    ) -> Result<(), RepoError> {
        if !role.is_base_role() {
            return Err(RoleError::invalid(role, "only canonical roles are bound in root").into());
        }
        let outgoing = if role == &RoleName::Root { Some(self.root_role(role)?) } else { None };
        let root = self.root.as_mut().ok_or(RepoError::NoRootLoaded)?;
        if let Some(outgoing) = outgoing
            && !self.previous_root_roles.contains(&outgoing)
        {
            self.previous_root_roles.push(outgoing);
        }
        root.signed.replace_role_keys(role, keys, threshold);
        self.root_dirty = true;
        Ok(())
    }

    /// Signs the working root with version + 1 and `expires`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Sign`] when the current or any superseded root
    /// role cannot reach its threshold, and [`RepoError::Verify`] when the
    /// produced signatures do not verify.
    pub fn sign_root(&mut self, expires: Timestamp, ctx: &CallContext) -> Result<SignedRoot, RepoError> {
        let current_role = self.root_role(&RoleName::Root)?;
        let mut body = self.root()?.signed.clone();
        body.version = next_version(body.version)?;
        body.expires = expires;
        let mut roles = vec![current_role];
        roles.extend(self.previous_root_roles.iter().cloned());
        let signed = self.sign_body(body, &roles, ctx)?;
        self.root_file = Some(FileMeta::from_bytes(&signed.encode()?));
        self.root = Some(signed.clone());
        self.root_dirty = false;
        self.previous_root_roles.clear();
        Ok(signed)
    }

    // ------------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------------

    /// Decodes stored targets-like bytes for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Role`] for non-targets roles and
    /// [`RepoError::Metadata`] for undecodable bytes.
    pub fn load_targets(&mut self, role: RoleName, bytes: &[u8]) -> Result<(), RepoError> {
        ensure_targets_role(&role)?;
        let document = SignedTargets::decode(bytes)?;
        self.target_files.insert(role.clone(), FileMeta::from_bytes(bytes));
        self.targets.insert(role, document);
        Ok(())
    }

    /// Starts an unsigned version-0 targets-like document for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Role`] for non-targets roles.
    pub fn init_targets(&mut self, role: RoleName, expires: Timestamp) -> Result<(), RepoError> {
        ensure_targets_role(&role)?;
        self.removed_roles.remove(&role);
        self.targets.insert(role.clone(), Signed::unsigned(TargetsMeta::new(expires)));
        self.dirty_targets.insert(role);
        Ok(())
    }

    /// Returns a loaded targets-like document.
    #[must_use]
    pub fn targets(&self, role: &RoleName) -> Option<&SignedTargets> {
        self.targets.get(role)
    }

    /// Returns the targets-like roles with unsigned edits.
    #[must_use]
    pub fn dirty_targets(&self) -> Vec<RoleName> {
        self.dirty_targets.iter().cloned().collect()
    }

    /// Returns delegated roles removed from their parent in this working set.
    #[must_use]
    pub fn removed_roles(&self) -> Vec<RoleName> {
        self.removed_roles.iter().cloned().collect()
    }

    /// Queues a loaded targets-like role for re-signature without editing it.
    /// Returns false when the role is not loaded.
    pub fn mark_dirty(&mut self, role: &RoleName) -> bool {
        if role.is_targets_role() && self.targets.contains_key(role) {
            self.dirty_targets.insert(role.clone());
            return true;
        }
        false
    }

    /// Signs a targets-like document with version + 1 and `expires`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the document is not loaded,
    /// [`RepoError::Sign`] when the role's keys fall short of its threshold.
    pub fn sign_targets(
        &mut self,
        role: &RoleName,
        expires: Timestamp,
        ctx: &CallContext,
    ) -> Result<SignedTargets, RepoError> {
        let signing_role = match role {
            RoleName::Targets => self.root_role(role)?,
            RoleName::Delegation(_) => self.delegation_role(role)?.base,
            _ => return Err(RoleError::invalid(role, "not a targets role").into()),
        };
        let mut body = self
            .targets
            .get(role)
            .ok_or_else(|| RepoError::RoleNotFound(role.to_string()))?
            .signed
            .clone();
        body.version = next_version(body.version)?;
        body.expires = expires;
        let signed = self.sign_body(body, &[signing_role], ctx)?;
        self.target_files.insert(role.clone(), FileMeta::from_bytes(&signed.encode()?));
        self.targets.insert(role.clone(), signed.clone());
        self.dirty_targets.remove(role);
        Ok(signed)
    }

    /// Adds or replaces a target in `role`'s document.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::InvalidTarget`] for a bad name,
    /// [`RepoError::TargetOutsidePaths`] when a delegated role may not sign
    /// for the name, and [`RepoError::RoleNotFound`] for unknown roles.
    pub fn add_target(&mut self, role: &RoleName, name: &str, meta: FileMeta) -> Result<(), RepoError> {
        validate_target_name(name)?;
        ensure_targets_role(role)?;
        if role.is_delegation() {
            let effective = self.delegation_role(role)?;
            if !effective.allows_target(name) {
                return Err(RepoError::TargetOutsidePaths {
                    role: role.to_string(),
                    target: name.to_string(),
                });
            }
        }
        self.ensure_targets_document(role)?;
        let document = self
            .targets
            .get_mut(role)
            .ok_or_else(|| RepoError::RoleNotFound(role.to_string()))?;
        document.signed.targets.insert(name.to_string(), meta);
        self.dirty_targets.insert(role.clone());
        Ok(())
    }

    /// Removes a target from `role`'s document; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the document is not loaded.
    pub fn remove_target(&mut self, role: &RoleName, name: &str) -> Result<bool, RepoError> {
        ensure_targets_role(role)?;
        let document = self
            .targets
            .get_mut(role)
            .ok_or_else(|| RepoError::RoleNotFound(role.to_string()))?;
        let removed = document.signed.targets.remove(name).is_some();
        if removed {
            self.dirty_targets.insert(role.clone());
        }
        Ok(removed)
    }

    /// Lists targets reachable from `roles` (or from `targets` when empty).
    ///
    /// Each start role's subtree is walked depth-first in delegation priority
    /// order; the first role listing a name wins, and names outside a
    /// delegated role's effective paths are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when a start role cannot be
    /// resolved and [`RepoError::Metadata`] for malformed delegations.
    pub fn list_targets(&self, roles: &[RoleName]) -> Result<Vec<TargetEntry>, RepoError> {
        let starts = if roles.is_empty() { vec![RoleName::Targets] } else { roles.to_vec() };
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut entries = Vec::new();
        for start in starts {
            self.walk(&start, |role, effective, document| {
                for (name, meta) in &document.signed.targets {
                    let allowed = effective.is_none_or(|scope| scope.allows_target(name));
                    if allowed && seen.insert(name.clone()) {
                        entries.push(TargetEntry {
                            name: name.clone(),
                            meta: meta.clone(),
                            role: role.clone(),
                        });
                    }
                }
            })?;
        }
        Ok(entries)
    }

    /// Returns the first listing of `name` in priority order.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`TrustRepo::list_targets`].
    pub fn get_target_by_name(&self, name: &str, roles: &[RoleName]) -> Result<Option<TargetEntry>, RepoError> {
        Ok(self.list_targets(roles)?.into_iter().find(|entry| entry.name == name))
    }

    /// Returns every delegated role reachable from `targets`, in walk order.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when `targets` is not loaded.
    pub fn delegation_roles(&self) -> Result<Vec<Role>, RepoError> {
        let mut roles = Vec::new();
        self.walk(&RoleName::Targets, |_, _, document| {
            roles.extend(document.signed.delegations.roles.iter().cloned());
        })?;
        Ok(roles)
    }

    /// Walks the loaded subtree under `start` depth-first, pre-order, in
    /// delegation priority order.
    fn walk(
        &self,
        start: &RoleName,
        mut visit: impl FnMut(&RoleName, Option<&DelegationRole>, &SignedTargets),
    ) -> Result<(), RepoError> {
        ensure_targets_role(start)?;
        let scope = match start {
            RoleName::Delegation(_) => Some(self.delegation_role(start)?),
            _ => None,
        };
        let mut stack: Vec<(RoleName, Option<DelegationRole>)> = vec![(start.clone(), scope)];
        while let Some((role, scope)) = stack.pop() {
            let Some(document) = self.targets.get(&role) else {
                if &role == start {
                    return Err(RepoError::RoleNotFound(role.to_string()));
                }
                continue;
            };
            visit(&role, scope.as_ref(), document);
            let delegations = &document.signed.delegations;
            let mut children = Vec::with_capacity(delegations.roles.len());
            for child in &delegations.roles {
                if child.name.parent().as_ref() != Some(&role) {
                    continue;
                }
                let resolved = delegations.delegation_role(&child.name)?;
                let effective = match &scope {
                    Some(parent) => parent.restrict(resolved)?,
                    None => resolved,
                };
                children.push((child.name.clone(), Some(effective)));
            }
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Delegations
    // ------------------------------------------------------------------------

    /// Resolves a delegated role with paths narrowed by every ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when an ancestor document is not
    /// loaded or does not delegate to the next role.
    pub fn delegation_role(&self, name: &RoleName) -> Result<DelegationRole, RepoError> {
        if !name.is_delegation() {
            return Err(RoleError::invalid(name, "not a delegated role").into());
        }
        let mut chain = vec![name.clone()];
        while let Some(parent) = chain.last().and_then(RoleName::parent) {
            if parent == RoleName::Targets {
                break;
            }
            chain.push(parent);
        }
        let mut effective: Option<DelegationRole> = None;
        for role in chain.iter().rev() {
            let parent = role.parent().ok_or_else(|| RepoError::RoleNotFound(role.to_string()))?;
            let document = self
                .targets
                .get(&parent)
                .ok_or_else(|| RepoError::RoleNotFound(parent.to_string()))?;
            let resolved = document.signed.delegations.delegation_role(role).map_err(|err| match err {
                MetadataError::MissingRole(_) => RepoError::RoleNotFound(role.to_string()),
                other => RepoError::Metadata(other),
            })?;
            effective = Some(match effective {
                Some(scope) => scope.restrict(resolved)?,
                None => resolved,
            });
        }
        effective.ok_or_else(|| RepoError::RoleNotFound(name.to_string()))
    }

    /// Adds keys and paths to a delegation, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Role`] for invalid names or paths and
    /// [`RepoError::RoleNotFound`] when the parent is unknown.
    pub fn add_delegation(&mut self, name: &RoleName, keys: &[PublicKey], paths: &[String]) -> Result<(), RepoError> {
        let key_ids: Vec<KeyId> = keys.iter().map(PublicKey::id).collect();
        self.edit_delegation(name, true, keys, |role| role.add_keys(&key_ids).add_paths(paths))
    }

    /// Adds keys to a delegation, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Role`] for invalid names and
    /// [`RepoError::RoleNotFound`] when the parent is unknown.
    pub fn add_delegation_role_and_keys(&mut self, name: &RoleName, keys: &[PublicKey]) -> Result<(), RepoError> {
        self.add_delegation(name, keys, &[])
    }

    /// Adds path grants to a delegation, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Role`] for invalid paths and
    /// [`RepoError::RoleNotFound`] when the parent is unknown.
    pub fn add_delegation_paths(&mut self, name: &RoleName, paths: &[String]) -> Result<(), RepoError> {
        self.add_delegation(name, &[], paths)
    }

    /// Removes keys and paths from an existing delegation.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the delegation does not exist.
    pub fn remove_delegation_keys_and_paths(
        &mut self,
        name: &RoleName,
        key_ids: &[KeyId],
        paths: &[String],
    ) -> Result<(), RepoError> {
        self.edit_delegation(name, false, &[], |role| Ok(role.remove_keys(key_ids).remove_paths(paths)))
    }

    /// Removes keys from an existing delegation.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the delegation does not exist.
    pub fn remove_delegation_keys(&mut self, name: &RoleName, key_ids: &[KeyId]) -> Result<(), RepoError> {
        self.remove_delegation_keys_and_paths(name, key_ids, &[])
    }

    /// Removes path grants from an existing delegation.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the delegation does not exist.
    pub fn remove_delegation_paths(&mut self, name: &RoleName, paths: &[String]) -> Result<(), RepoError> {
        self.remove_delegation_keys_and_paths(name, &[], paths)
    }

    /// Empties a delegation's path grants, keeping the role and its keys.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the delegation does not exist.
    pub fn clear_delegation_paths(&mut self, name: &RoleName) -> Result<(), RepoError> {
        self.edit_delegation(name, false, &[], |role| Ok(role.clear_paths()))
    }

    /// Removes a delegation from its parent and sweeps keys no remaining
    /// sibling uses. Nested delegations defined in the removed role's own
    /// document are left in place, unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::RoleNotFound`] when the delegation does not exist.
    pub fn remove_delegation_role(&mut self, name: &RoleName) -> Result<(), RepoError> {
        let parent = delegation_parent(name)?;
        let document = self
            .targets
            .get_mut(&parent)
            .ok_or_else(|| RepoError::RoleNotFound(parent.to_string()))?;
        let delegations = &mut document.signed.delegations;
        let before = delegations.roles.len();
        delegations.roles.retain(|role| &role.name != name);
        if delegations.roles.len() == before {
            return Err(RepoError::RoleNotFound(name.to_string()));
        }
        delegations.purge_unused_keys();
        self.dirty_targets.insert(parent);
        self.dirty_targets.remove(name);
        self.targets.remove(name);
        self.target_files.remove(name);
        self.removed_roles.insert(name.clone());
        Ok(())
    }

    /// Applies `edit` to a delegation record held by its parent document.
    fn edit_delegation(
        &mut self,
        name: &RoleName,
        create: bool,
        new_keys: &[PublicKey],
        edit: impl FnOnce(Role) -> Result<Role, RoleError>,
    ) -> Result<(), RepoError> {
        let parent = delegation_parent(name)?;
        self.ensure_targets_document(&parent)?;
        let document = self
            .targets
            .get_mut(&parent)
            .ok_or_else(|| RepoError::RoleNotFound(parent.to_string()))?;
        let delegations = &mut document.signed.delegations;
        let position = delegations.roles.iter().position(|role| &role.name == name);
        let current = match position.and_then(|index| delegations.roles.get(index)) {
            Some(existing) => existing.clone(),
            None if create => Role::new(name.clone(), DEFAULT_DELEGATION_THRESHOLD, &[], &[])?,
            None => return Err(RepoError::RoleNotFound(name.to_string())),
        };
        let updated = edit(current)?;
        for key in new_keys {
            delegations.keys.insert(key.id(), key.clone());
        }
        match position.and_then(|index| delegations.roles.get_mut(index)) {
            Some(slot) => *slot = updated,
            None => delegations.roles.push(updated),
        }
        delegations.purge_unused_keys();
        self.dirty_targets.insert(parent);
        Ok(())
    }

    /// Makes sure a document exists for a targets-like role, creating an
    /// empty one for delegations their parent already declares.
    fn ensure_targets_document(&mut self, role: &RoleName) -> Result<(), RepoError> {
        if self.targets.contains_key(role) {
            return Ok(());
        }
        match role {
            RoleName::Delegation(_) => {
                self.delegation_role(role)?;
                // Expiry is replaced when the document is first signed.
                self.init_targets(role.clone(), Timestamp::max())
            }
            _ => Err(RepoError::RoleNotFound(role.to_string())),
        }
    }

    // ------------------------------------------------------------------------
    // Snapshot and Timestamp
    // ------------------------------------------------------------------------

    /// Seeds the working snapshot from the last persisted one.
    pub fn set_snapshot(&mut self, snapshot: SignedSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Starts a version-0 snapshot skeleton.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoRootLoaded`] when root has not been set.
    pub fn init_snapshot(&mut self) -> Result<(), RepoError> {
        let root = self.root()?;
        self.snapshot = Some(Signed::unsigned(SnapshotMeta::new(root.signed.expires)));
        Ok(())
    }

    /// Returns the working snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&SignedSnapshot> {
        self.snapshot.as_ref()
    }

    /// Folds current file meta into the snapshot and signs it with
    /// version + 1 (or 1) and `expires`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoRootLoaded`] without a root and
    /// [`RepoError::Sign`] when the snapshot keys fall short of threshold.
    pub fn sign_snapshot(&mut self, expires: Timestamp, ctx: &CallContext) -> Result<SignedSnapshot, RepoError> {
        if self.snapshot.is_none() {
            self.init_snapshot()?;
        }
        let signing_role = self.root_role(&RoleName::Snapshot)?;
        let root_file = match &self.root_file {
            Some(meta) => meta.clone(),
            None => FileMeta::from_bytes(&self.root()?.encode()?),
        };
        let mut body = self
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.signed.clone())
            .ok_or(RepoError::NoRootLoaded)?;
        body.meta.insert(RoleName::Root, root_file);
        for (role, document) in &self.targets {
            let meta = match self.target_files.get(role) {
                Some(meta) => meta.clone(),
                None => FileMeta::from_bytes(&document.encode()?),
            };
            body.meta.insert(role.clone(), meta);
        }
        for role in &self.removed_roles {
            body.meta.remove(role);
        }
        body.version = next_version(body.version)?;
        body.expires = expires;
        let signed = self.sign_body(body, &[signing_role], ctx)?;
        self.snapshot = Some(signed.clone());
        Ok(signed)
    }

    /// Seeds the working timestamp from the last persisted one.
    pub fn set_timestamp(&mut self, timestamp: SignedTimestamp) {
        self.timestamp = Some(timestamp);
    }

    /// Signs a timestamp recording `snapshot_bytes`, with version + 1 (or 1).
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoRootLoaded`] without a root and
    /// [`RepoError::Sign`] when the timestamp keys fall short of threshold.
    pub fn sign_timestamp(
        &mut self,
        snapshot_bytes: &[u8],
        expires: Timestamp,
        ctx: &CallContext,
    ) -> Result<SignedTimestamp, RepoError> {
        let signing_role = self.root_role(&RoleName::Timestamp)?;
        let mut body = self
            .timestamp
            .as_ref()
            .map_or_else(|| TimestampMeta::new(expires), |timestamp| timestamp.signed.clone());
        body.meta.insert(RoleName::Snapshot, FileMeta::from_bytes(snapshot_bytes));
        body.version = next_version(body.version)?;
        body.expires = expires;
        let signed = self.sign_body(body, &[signing_role], ctx)?;
        self.timestamp = Some(signed.clone());
        Ok(signed)
    }

    // ------------------------------------------------------------------------
    // Signing
    // ------------------------------------------------------------------------

    /// Signs `body` so that every role in `roles` reaches its threshold, then
    /// verifies the result against each role.
    fn sign_body<T: Document>(
        &self,
        body: T,
        roles: &[BaseRole],
        ctx: &CallContext,
    ) -> Result<Signed<T>, RepoError> {
        let mut signed = Signed::unsigned(body);
        let payload = signed.signed_bytes()?;
        let ctx = match self.signing_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };
        let mut signatures: Vec<Signature> = Vec::new();
        for role in roles {
            let mut available = 0_usize;
            for key_id in role.keys.keys() {
                if signatures.iter().any(|signature| &signature.key_id == key_id) {
                    available += 1;
                    continue;
                }
                ctx.check().map_err(|err| SignError::Unavailable(err.to_string()))?;
                match self.crypto.sign(key_id, &payload, &ctx) {
                    Ok(signature) => {
                        signatures.push(signature);
                        available += 1;
                    }
                    Err(CryptoError::KeyNotFound(_)) => {}
                    Err(CryptoError::Unavailable(reason)) => {
                        return Err(SignError::Unavailable(reason).into());
                    }
                    Err(other) => return Err(SignError::Crypto(other.to_string()).into()),
                }
            }
            let needed = usize::try_from(role.threshold).unwrap_or(usize::MAX);
            if role.threshold == 0 || available < needed {
                return Err(SignError::KeyNotFound {
                    role: role.name.to_string(),
                    threshold: role.threshold,
                    available,
                }
                .into());
            }
        }
        signed.signatures = signatures;
        for role in roles {
            verify_signed(&mut signed, role)?;
        }
        Ok(signed)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns `version + 1`.
fn next_version(version: u64) -> Result<u64, RepoError> {
    version
        .checked_add(1)
        .ok_or_else(|| MetadataError::Encode("document version overflow".to_string()).into())
}

/// Rejects roles that do not carry targets.
fn ensure_targets_role(role: &RoleName) -> Result<(), RepoError> {
    if role.is_targets_role() {
        Ok(())
    } else {
        Err(RoleError::invalid(role, "not a targets role").into())
    }
}

/// Returns the parent of a delegated role.
fn delegation_parent(name: &RoleName) -> Result<RoleName, RepoError> {
    name.parent().ok_or_else(|| RoleError::invalid(name, "not a delegated role").into())
}

/// Validates a target name.
fn validate_target_name(name: &str) -> Result<(), RepoError> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.starts_with('/') {
        Some("name must be relative")
    } else if name.chars().any(char::is_control) {
        Some("name must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RepoError::InvalidTarget {
            target: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
