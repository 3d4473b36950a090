// crates/signet-core/src/core/roles.rs
// ============================================================================
// Module: Signet Role Model
// Description: Role names, delegation path rules, and immutable role records.
// Purpose: Validate every role before it can reach a signed document.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Four canonical roles (`root`, `targets`, `snapshot`, `timestamp`) anchor a
//! namespace. Delegated roles are named by a slash-separated path under
//! `targets/` and may only be built through [`DelegationPath::parse`].
//!
//! A delegation name is valid when it:
//! - starts with `targets/`;
//! - uses only `a-z`, `0-9`, `-`, `_` and `/`;
//! - has no empty, `.` or `..` segment (so no doubled or trailing slash);
//! - is at most [`MAX_ROLE_NAME_LENGTH`] bytes long.
//!
//! A wildcard grant is a delegation name (or `targets`) followed by exactly
//! one trailing `/*`.
//!
//! Role edits are consuming operations returning a new value. Key and path
//! lists behave as ordered sets: first insertion order wins and duplicates
//! are dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

use crate::core::identifiers::KeyId;
use crate::core::keys::PublicKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length in bytes of a delegated role name or path grant.
pub const MAX_ROLE_NAME_LENGTH: usize = 255;
/// Prefix shared by every delegated role name.
pub const DELEGATION_PREFIX: &str = "targets/";
/// Suffix marking a wildcard path grant.
pub const WILDCARD_SUFFIX: &str = "/*";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Role validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Role name or structure is not acceptable.
    #[error("invalid role {role}: {reason}")]
    InvalidRole {
        /// Offending role name.
        role: String,
        /// Human-readable reason.
        reason: String,
    },
    /// A path grant is not a delegation or wildcard delegation.
    #[error("invalid path {path} for role {role}")]
    InvalidPath {
        /// Role the grant was attached to.
        role: String,
        /// Offending path grant.
        path: String,
    },
    /// Threshold exceeds the number of keys, so the role can never sign.
    #[error("role {role} is unusable: threshold {threshold} exceeds {keys} keys")]
    Unusable {
        /// Role name.
        role: String,
        /// Required signatures.
        threshold: u32,
        /// Keys present.
        keys: usize,
    },
}

impl RoleError {
    /// Builds an [`RoleError::InvalidRole`] from display values.
    pub(crate) fn invalid(role: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidRole {
            role: role.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// SECTION: Name Predicates
// ============================================================================

/// Returns true when `segment` is one clean, whitelisted path segment.
fn is_clean_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.bytes().all(|byte| matches!(byte, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_'))
}

/// Returns true when `candidate` is a valid delegated role name.
#[must_use]
pub fn is_delegation(candidate: &str) -> bool {
    candidate.len() <= MAX_ROLE_NAME_LENGTH
        && candidate
            .strip_prefix(DELEGATION_PREFIX)
            .is_some_and(|rest| rest.split('/').all(is_clean_segment))
}

/// Returns true when `candidate` is a wildcard delegation grant such as
/// `targets/*` or `targets/team/*`.
#[must_use]
pub fn is_wild_delegation(candidate: &str) -> bool {
    candidate.len() <= MAX_ROLE_NAME_LENGTH
        && candidate
            .strip_suffix(WILDCARD_SUFFIX)
            .is_some_and(|base| base == RoleName::TARGETS || is_delegation(base))
}

/// Returns true when `candidate` names one of the four canonical roles.
#[must_use]
pub fn is_base_role(candidate: &str) -> bool {
    matches!(
        candidate,
        RoleName::ROOT | RoleName::TARGETS | RoleName::SNAPSHOT | RoleName::TIMESTAMP
    )
}

/// Returns true when `candidate` is a canonical role or a valid delegation.
#[must_use]
pub fn is_valid_role_name(candidate: &str) -> bool {
    is_base_role(candidate) || is_delegation(candidate)
}

/// Returns true when `path` may be granted to a delegated role.
#[must_use]
pub fn is_valid_path_grant(path: &str) -> bool {
    is_delegation(path) || is_wild_delegation(path)
}

/// Returns true when path grant `grant` authorizes target `target_name`.
///
/// Target names are resolved under `targets/`: a plain grant authorizes the
/// name itself and everything beneath it; a wildcard grant `X/*` authorizes
/// exactly one additional segment below `X`.
#[must_use]
pub fn grant_matches_target(grant: &str, target_name: &str) -> bool {
    if target_name.is_empty() {
        return false;
    }
    let full = format!("{DELEGATION_PREFIX}{target_name}");
    if let Some(base) = grant.strip_suffix(WILDCARD_SUFFIX) {
        return full
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'));
    }
    full == grant || full.strip_prefix(grant).is_some_and(|rest| rest.starts_with('/'))
}

/// Returns true when parent grant `parent` covers child grant `child`.
#[must_use]
pub fn grant_covers(parent: &str, child: &str) -> bool {
    if parent == child {
        return true;
    }
    if let Some(base) = parent.strip_suffix(WILDCARD_SUFFIX) {
        return child
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'));
    }
    child.strip_prefix(parent).is_some_and(|rest| rest.starts_with('/'))
}

// ============================================================================
// SECTION: Role Names
// ============================================================================

/// Validated delegated role name (always below `targets/`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DelegationPath(String);

impl DelegationPath {
    /// Parses a delegated role name.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] when `value` is not a valid delegation name.
    pub fn parse(value: &str) -> Result<Self, RoleError> {
        if is_delegation(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(RoleError::invalid(value, "not a valid delegation name"))
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the role this delegation hangs off (`targets` or another delegation).
    #[must_use]
    pub fn parent(&self) -> RoleName {
        match self.0.rsplit_once('/') {
            Some((head, _)) if is_delegation(head) => RoleName::Delegation(Self(head.to_string())),
            _ => RoleName::Targets,
        }
    }

    /// Returns the number of segments below `targets`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.matches('/').count()
    }
}

impl fmt::Display for DelegationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a canonical or delegated role.
///
/// # Invariants
/// - Serializes as the bare role string (`"root"`, `"targets/releases"`).
/// - Ordering places canonical roles first (root, targets, snapshot,
///   timestamp) followed by delegations in lexical order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoleName {
    /// Root of trust for the namespace.
    Root,
    /// Top-level targets role.
    Targets,
    /// Snapshot role.
    Snapshot,
    /// Timestamp role.
    Timestamp,
    /// Delegated targets role.
    Delegation(DelegationPath),
}

impl RoleName {
    /// Wire name of the root role.
    pub const ROOT: &'static str = "root";
    /// Wire name of the targets role.
    pub const TARGETS: &'static str = "targets";
    /// Wire name of the snapshot role.
    pub const SNAPSHOT: &'static str = "snapshot";
    /// Wire name of the timestamp role.
    pub const TIMESTAMP: &'static str = "timestamp";

    /// Canonical roles in declaration order.
    pub const BASE_ROLES: [Self; 4] = [Self::Root, Self::Targets, Self::Snapshot, Self::Timestamp];

    /// Parses a role name.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] for anything other than a canonical
    /// role or a valid delegation name.
    pub fn parse(value: &str) -> Result<Self, RoleError> {
        match value {
            Self::ROOT => Ok(Self::Root),
            Self::TARGETS => Ok(Self::Targets),
            Self::SNAPSHOT => Ok(Self::Snapshot),
            Self::TIMESTAMP => Ok(Self::Timestamp),
            other => DelegationPath::parse(other).map(Self::Delegation),
        }
    }

    /// Builds a delegated role name.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] when `value` is not a delegation name.
    pub fn delegation(value: &str) -> Result<Self, RoleError> {
        DelegationPath::parse(value).map(Self::Delegation)
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Root => Self::ROOT,
            Self::Targets => Self::TARGETS,
            Self::Snapshot => Self::SNAPSHOT,
            Self::Timestamp => Self::TIMESTAMP,
            Self::Delegation(path) => path.as_str(),
        }
    }

    /// Returns true for the four canonical roles.
    #[must_use]
    pub const fn is_base_role(&self) -> bool {
        !matches!(self, Self::Delegation(_))
    }

    /// Returns true for delegated roles.
    #[must_use]
    pub const fn is_delegation(&self) -> bool {
        matches!(self, Self::Delegation(_))
    }

    /// Returns true for roles whose documents carry targets (`targets` and delegations).
    #[must_use]
    pub const fn is_targets_role(&self) -> bool {
        matches!(self, Self::Targets | Self::Delegation(_))
    }

    /// Returns the delegating parent of a delegated role.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Delegation(path) => Some(path.parent()),
            _ => None,
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = RoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for RoleName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Ordered Set Helpers
// ============================================================================

/// Appends the items of `additions` not already in `base`, preserving the
/// order of first appearance.
#[must_use]
pub fn merge_ordered<T: Clone + PartialEq>(base: &[T], additions: &[T]) -> Vec<T> {
    let mut merged: Vec<T> = Vec::with_capacity(base.len() + additions.len());
    for item in base.iter().chain(additions) {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Removes every item of `removals` from `base`, preserving order.
#[must_use]
pub fn subtract_ordered<T: Clone + PartialEq>(base: &[T], removals: &[T]) -> Vec<T> {
    base.iter().filter(|item| !removals.contains(item)).cloned().collect()
}

// ============================================================================
// SECTION: Base Role
// ============================================================================

/// Role name plus threshold and the public keys that may sign for it.
///
/// # Invariants
/// - Equality ignores key insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRole {
    /// Role name.
    pub name: RoleName,
    /// Signatures required from distinct keys.
    pub threshold: u32,
    /// Keys keyed by identifier.
    pub keys: BTreeMap<KeyId, PublicKey>,
}

impl BaseRole {
    /// Creates a role from a key list.
    #[must_use]
    pub fn new(name: RoleName, threshold: u32, keys: impl IntoIterator<Item = PublicKey>) -> Self {
        let keys = keys.into_iter().map(|key| (key.id(), key)).collect();
        Self {
            name,
            threshold,
            keys,
        }
    }

    /// Returns key identifiers in sorted order.
    #[must_use]
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.keys.keys().cloned().collect()
    }

    /// Returns true when `key_id` belongs to this role.
    #[must_use]
    pub fn has_key(&self, key_id: &KeyId) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Checks that the role can ever be satisfied.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] for a zero threshold and
    /// [`RoleError::Unusable`] when the threshold exceeds the key count.
    pub fn validate(&self) -> Result<(), RoleError> {
        check_threshold(&self.name, self.threshold, self.keys.len())
    }
}

/// Shared threshold check for roles.
fn check_threshold(name: &RoleName, threshold: u32, keys: usize) -> Result<(), RoleError> {
    if threshold == 0 {
        return Err(RoleError::invalid(name, "threshold must be at least 1"));
    }
    if !usize::try_from(threshold).is_ok_and(|needed| needed <= keys) {
        return Err(RoleError::Unusable {
            role: name.to_string(),
            threshold,
            keys,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Role Record
// ============================================================================

/// Role record as carried in a delegating document: names keys by identifier.
///
/// # Invariants
/// - `threshold >= 1`.
/// - `key_ids` and `paths` contain no duplicates.
/// - For delegated roles every path passes [`is_valid_path_grant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name.
    pub name: RoleName,
    /// Signing key identifiers.
    #[serde(rename = "keyids")]
    pub key_ids: Vec<KeyId>,
    /// Signatures required.
    pub threshold: u32,
    /// Path grants (delegated roles only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

impl Role {
    /// Creates a validated role record.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] for a zero threshold and
    /// [`RoleError::InvalidPath`] when a delegated role receives a bad path.
    pub fn new(
        name: RoleName,
        threshold: u32,
        key_ids: &[KeyId],
        paths: &[String],
    ) -> Result<Self, RoleError> {
        if threshold == 0 {
            return Err(RoleError::invalid(&name, "threshold must be at least 1"));
        }
        if name.is_delegation() {
            validate_paths(&name, paths)?;
        }
        Ok(Self {
            name,
            key_ids: merge_ordered(&[], key_ids),
            threshold,
            paths: merge_ordered(&[], paths),
        })
    }

    /// Returns a copy with `key_ids` added.
    #[must_use]
    pub fn add_keys(self, key_ids: &[KeyId]) -> Self {
        Self {
            key_ids: merge_ordered(&self.key_ids, key_ids),
            ..self
        }
    }

    /// Returns a copy with `key_ids` removed.
    #[must_use]
    pub fn remove_keys(self, key_ids: &[KeyId]) -> Self {
        Self {
            key_ids: subtract_ordered(&self.key_ids, key_ids),
            ..self
        }
    }

    /// Returns a copy with `paths` added. Adding nothing is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] when paths are added to a
    /// canonical role and [`RoleError::InvalidPath`] for a bad grant.
    pub fn add_paths(self, paths: &[String]) -> Result<Self, RoleError> {
        if paths.is_empty() {
            return Ok(self);
        }
        if !self.name.is_delegation() {
            return Err(RoleError::invalid(&self.name, "only delegated roles carry paths"));
        }
        validate_paths(&self.name, paths)?;
        Ok(Self {
            paths: merge_ordered(&self.paths, paths),
            ..self
        })
    }

    /// Returns a copy with `paths` removed.
    #[must_use]
    pub fn remove_paths(self, paths: &[String]) -> Self {
        Self {
            paths: subtract_ordered(&self.paths, paths),
            ..self
        }
    }

    /// Returns a copy with no paths.
    #[must_use]
    pub fn clear_paths(self) -> Self {
        Self {
            paths: Vec::new(),
            ..self
        }
    }

    /// Returns true when this role may list `target_name`.
    #[must_use]
    pub fn allows_target(&self, target_name: &str) -> bool {
        self.paths.iter().any(|grant| grant_matches_target(grant, target_name))
    }
}

/// Validates every path grant for a delegated role.
fn validate_paths(name: &RoleName, paths: &[String]) -> Result<(), RoleError> {
    match paths.iter().find(|path| !is_valid_path_grant(path)) {
        Some(path) => Err(RoleError::InvalidPath {
            role: name.to_string(),
            path: path.clone(),
        }),
        None => Ok(()),
    }
}

/// Validates a role record as a whole.
///
/// # Errors
///
/// Returns [`RoleError::InvalidRole`] for a zero threshold,
/// [`RoleError::InvalidPath`] for a bad grant on a delegated role, and
/// [`RoleError::Unusable`] when the threshold exceeds the key count.
pub fn validate_role(role: &Role) -> Result<(), RoleError> {
    if role.name.is_delegation() {
        validate_paths(&role.name, &role.paths)?;
    }
    check_threshold(&role.name, role.threshold, role.key_ids.len())
}

// ============================================================================
// SECTION: Delegation Role
// ============================================================================

/// Resolved delegated role: keys plus the path grants it may sign under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationRole {
    /// Keys and threshold.
    pub base: BaseRole,
    /// Effective path grants.
    pub paths: Vec<String>,
}

impl DelegationRole {
    /// Returns the role name.
    #[must_use]
    pub const fn name(&self) -> &RoleName {
        &self.base.name
    }

    /// Returns true when this role may list `target_name`.
    #[must_use]
    pub fn allows_target(&self, target_name: &str) -> bool {
        self.paths.iter().any(|grant| grant_matches_target(grant, target_name))
    }

    /// Returns true when this role is the direct parent of `child`.
    #[must_use]
    pub fn is_parent_of(&self, child: &RoleName) -> bool {
        child.parent().as_ref() == Some(&self.base.name)
    }

    /// Narrows `child` to the grants this role itself holds.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError::InvalidRole`] when `child` is not a direct child.
    pub fn restrict(&self, child: Self) -> Result<Self, RoleError> {
        if !self.is_parent_of(child.name()) {
            return Err(RoleError::invalid(
                child.name(),
                format!("not a direct child of {}", self.base.name),
            ));
        }
        let paths = child
            .paths
            .iter()
            .filter(|grant| self.paths.iter().any(|parent| grant_covers(parent, grant)))
            .cloned()
            .collect();
        Ok(Self {
            base: child.base,
            paths,
        })
    }
}
