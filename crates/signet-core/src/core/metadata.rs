// crates/signet-core/src/core/metadata.rs
// ============================================================================
// Module: Signet Metadata Documents
// Description: Signed root, targets, snapshot, and timestamp documents.
// Purpose: Define the persisted trust documents and their canonical encoding.
// Dependencies: base64, serde, serde_json, serde_jcs
// ============================================================================

//! ## Overview
//! Every document is a [`Signed`] envelope around a typed body. Signatures
//! cover the RFC 8785 bytes of the body; the envelope itself is persisted as
//! RFC 8785 bytes too, so re-encoding a decoded document reproduces the
//! stored bytes exactly.
//!
//! Security posture: decoded documents are untrusted until
//! [`crate::core::verify::verify_signed`] accepts them; decoding only checks
//! structure and the document type tag.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_bytes;
use crate::core::identifiers::KeyId;
use crate::core::keys::PublicKey;
use crate::core::keys::SignatureMethod;
use crate::core::roles::BaseRole;
use crate::core::roles::DelegationRole;
use crate::core::roles::Role;
use crate::core::roles::RoleError;
use crate::core::roles::RoleName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Metadata encoding and structure errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Canonical encoding failed.
    #[error("metadata encoding failed: {0}")]
    Encode(String),
    /// Bytes do not decode as the expected document.
    #[error("metadata decoding failed: {0}")]
    Decode(String),
    /// Document carries a different type tag than expected.
    #[error("expected {expected} document, found {found}")]
    WrongKind {
        /// Expected document kind.
        expected: &'static str,
        /// Kind found in the document.
        found: &'static str,
    },
    /// Root does not define a role.
    #[error("root does not define role {0}")]
    MissingRole(String),
    /// Root role references a key that root does not list.
    #[error("role {role} references unknown key {key_id}")]
    UnknownKey {
        /// Role name.
        role: String,
        /// Missing key identifier.
        key_id: KeyId,
    },
    /// A key is listed under an id that its material does not hash to.
    #[error("key listed as {listed} derives id {derived}")]
    KeyIdMismatch {
        /// Identifier the document files the key under.
        listed: KeyId,
        /// Identifier derived from the key material.
        derived: KeyId,
    },
    /// Role structure failed validation.
    #[error(transparent)]
    Role(#[from] RoleError),
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// One signature over the canonical bytes of a document body.
///
/// # Invariants
/// - `is_valid` is a verification cache: never serialized and ignored by
///   equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Signing key identifier.
    #[serde(rename = "keyid")]
    pub key_id: KeyId,
    /// Signature method.
    pub method: SignatureMethod,
    /// Raw signature bytes.
    #[serde(rename = "sig", with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// Result of the last verification pass.
    #[serde(skip)]
    pub is_valid: bool,
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.key_id == other.key_id
            && self.method == other.method
            && self.signature == other.signature
    }
}

impl Eq for Signature {}

/// Serde adapter encoding byte vectors as standard base64 strings.
mod base64_bytes {
    use super::Base64;
    use super::Engine;

    /// Serializes bytes as base64.
    pub fn serialize<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64.encode(bytes))
    }

    /// Deserializes base64 into bytes.
    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        Base64.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: File Meta
// ============================================================================

/// Length and hashes of one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Length in bytes.
    pub length: u64,
    /// Lowercase hex digests keyed by algorithm.
    pub hashes: BTreeMap<HashAlgorithm, String>,
}

impl FileMeta {
    /// Computes file meta over `bytes` exactly as stored.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert(HashAlgorithm::Sha256, hash_bytes(HashAlgorithm::Sha256, bytes));
        Self {
            length: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            hashes,
        }
    }

    /// Returns true when `bytes` have this length and every recorded hash.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        let observed = Self::from_bytes(bytes);
        observed.length == self.length
            && !self.hashes.is_empty()
            && self
                .hashes
                .iter()
                .all(|(algorithm, value)| observed.hashes.get(algorithm) == Some(value))
    }

    /// Returns the SHA-256 digest, if recorded.
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get(&HashAlgorithm::Sha256).map(String::as_str)
    }
}

// ============================================================================
// SECTION: Document Kinds
// ============================================================================

/// Document type tag carried in the `_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Root document.
    Root,
    /// Targets or delegated targets document.
    Targets,
    /// Snapshot document.
    Snapshot,
    /// Timestamp document.
    Timestamp,
}

impl DocumentKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Targets => "targets",
            Self::Snapshot => "snapshot",
            Self::Timestamp => "timestamp",
        }
    }

    /// Returns the document kind stored for `role`.
    #[must_use]
    pub const fn for_role(role: &RoleName) -> Self {
        match role {
            RoleName::Root => Self::Root,
            RoleName::Targets | RoleName::Delegation(_) => Self::Targets,
            RoleName::Snapshot => Self::Snapshot,
            RoleName::Timestamp => Self::Timestamp,
        }
    }
}

/// Common behavior of signed document bodies.
pub trait Document: Serialize + DeserializeOwned + Clone {
    /// Expected type tag.
    const KIND: DocumentKind;

    /// Returns the type tag found in the body.
    fn kind(&self) -> DocumentKind;

    /// Returns the document version.
    fn version(&self) -> u64;

    /// Returns the expiry.
    fn expires(&self) -> Timestamp;
}

/// Implements [`Document`] for a body with `kind`, `version`, and `expires` fields.
macro_rules! impl_document {
    ($body:ty, $kind:expr) => {
        impl Document for $body {
            const KIND: DocumentKind = $kind;

            fn kind(&self) -> DocumentKind {
                self.kind
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn expires(&self) -> Timestamp {
                self.expires
            }
        }
    };
}

// ============================================================================
// SECTION: Signed Envelope
// ============================================================================

/// Signed envelope around a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<T> {
    /// Signatures over the canonical body bytes.
    pub signatures: Vec<Signature>,
    /// Document body.
    pub signed: T,
}

impl<T: Document> Signed<T> {
    /// Wraps an unsigned body.
    #[must_use]
    pub const fn unsigned(body: T) -> Self {
        Self {
            signatures: Vec::new(),
            signed: body,
        }
    }

    /// Returns the canonical bytes covered by signatures.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Encode`] when canonicalization fails.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, MetadataError> {
        canonical_json_bytes(&self.signed).map_err(|err| MetadataError::Encode(err.to_string()))
    }

    /// Encodes the envelope as canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Encode`] when canonicalization fails.
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        canonical_json_bytes(self).map_err(|err| MetadataError::Encode(err.to_string()))
    }

    /// Decodes an envelope and checks its type tag.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Decode`] for malformed bytes and
    /// [`MetadataError::WrongKind`] when the type tag differs.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        let decoded: Self =
            serde_json::from_slice(bytes).map_err(|err| MetadataError::Decode(err.to_string()))?;
        let found = decoded.signed.kind();
        if found != T::KIND {
            return Err(MetadataError::WrongKind {
                expected: T::KIND.as_str(),
                found: found.as_str(),
            });
        }
        Ok(decoded)
    }

    /// Returns the body version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.signed.version()
    }

    /// Returns the body expiry.
    #[must_use]
    pub fn expires(&self) -> Timestamp {
        self.signed.expires()
    }

    /// Returns true when the document is stale at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.signed.expires().is_expired_at(now)
    }
}

/// Signed root document.
pub type SignedRoot = Signed<RootMeta>;
/// Signed targets or delegated targets document.
pub type SignedTargets = Signed<TargetsMeta>;
/// Signed snapshot document.
pub type SignedSnapshot = Signed<SnapshotMeta>;
/// Signed timestamp document.
pub type SignedTimestamp = Signed<TimestampMeta>;

// ============================================================================
// SECTION: Root
// ============================================================================

/// Key ids and threshold for one canonical role inside root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRole {
    /// Signing key identifiers in insertion order.
    #[serde(rename = "keyids")]
    pub key_ids: Vec<KeyId>,
    /// Signatures required.
    pub threshold: u32,
}

/// Root document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMeta {
    /// Type tag.
    #[serde(rename = "_type")]
    pub kind: DocumentKind,
    /// Document version.
    pub version: u64,
    /// Expiry.
    pub expires: Timestamp,
    /// Whether clients fetch metadata by hash.
    pub consistent_snapshot: bool,
    /// Every key referenced by a canonical role.
    pub keys: BTreeMap<KeyId, PublicKey>,
    /// Canonical role definitions.
    pub roles: BTreeMap<RoleName, RootRole>,
}

impl_document!(RootMeta, DocumentKind::Root);

impl RootMeta {
    /// Creates a version-0 root with the given role key sets (threshold 1 each).
    #[must_use]
    pub fn new(expires: Timestamp, role_keys: &BTreeMap<RoleName, Vec<PublicKey>>) -> Self {
        let mut root = Self {
            kind: DocumentKind::Root,
            version: 0,
            expires,
            consistent_snapshot: false,
            keys: BTreeMap::new(),
            roles: BTreeMap::new(),
        };
        for (role, keys) in role_keys {
            root.replace_role_keys(role, keys, 1);
        }
        root
    }

    /// Resolves a canonical role into keys plus threshold.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::MissingRole`] when root does not define the
    /// role, [`MetadataError::UnknownKey`] when a listed key is missing, and
    /// [`MetadataError::KeyIdMismatch`] when a key is filed under an id its
    /// material does not derive.
    pub fn base_role(&self, role: &RoleName) -> Result<BaseRole, MetadataError> {
        let entry = self
            .roles
            .get(role)
            .ok_or_else(|| MetadataError::MissingRole(role.to_string()))?;
        Ok(BaseRole {
            name: role.clone(),
            threshold: entry.threshold,
            keys: resolve_keys(&self.keys, role, &entry.key_ids)?,
        })
    }

    /// Binds `keys` to `role` with `threshold`, replacing its previous key
    /// list, then drops root keys no role references any more.
    pub fn replace_role_keys(&mut self, role: &RoleName, keys: &[PublicKey], threshold: u32) {
        let key_ids: Vec<KeyId> = keys.iter().map(PublicKey::id).collect();
        let previous = self.roles.get(role).map(|entry| entry.key_ids.clone()).unwrap_or_default();
        let record = Role {
            name: role.clone(),
            key_ids: previous,
            threshold,
            paths: Vec::new(),
        };
        let stale: Vec<KeyId> =
            record.key_ids.iter().filter(|id| !key_ids.contains(id)).cloned().collect();
        let record = record.remove_keys(&stale).add_keys(&key_ids);
        for key in keys {
            self.keys.insert(key.id(), key.clone());
        }
        self.roles.insert(
            role.clone(),
            RootRole {
                key_ids: record.key_ids,
                threshold,
            },
        );
        self.purge_unused_keys();
    }

    /// Removes keys no canonical role references.
    pub fn purge_unused_keys(&mut self) {
        let referenced: BTreeSet<&KeyId> =
            self.roles.values().flat_map(|entry| entry.key_ids.iter()).collect();
        self.keys.retain(|key_id, _| referenced.contains(key_id));
    }
}

// ============================================================================
// SECTION: Targets
// ============================================================================

/// Delegation listing carried by a targets-like document.
///
/// # Invariants
/// - `roles` order is priority order for path resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    /// Keys used by delegated roles.
    pub keys: BTreeMap<KeyId, PublicKey>,
    /// Delegated roles in priority order.
    pub roles: Vec<Role>,
}

impl Delegations {
    /// Returns true when nothing is delegated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.roles.is_empty()
    }

    /// Finds a delegated role by name.
    #[must_use]
    pub fn role(&self, name: &RoleName) -> Option<&Role> {
        self.roles.iter().find(|role| &role.name == name)
    }

    /// Resolves a delegated role into keys plus its own path grants.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::MissingRole`] when the role is not delegated
    /// here, [`MetadataError::UnknownKey`] when a key is missing, and
    /// [`MetadataError::KeyIdMismatch`] when a key is filed under the wrong id.
    pub fn delegation_role(&self, name: &RoleName) -> Result<DelegationRole, MetadataError> {
        let role = self.role(name).ok_or_else(|| MetadataError::MissingRole(name.to_string()))?;
        Ok(DelegationRole {
            base: BaseRole {
                name: name.clone(),
                threshold: role.threshold,
                keys: resolve_keys(&self.keys, name, &role.key_ids)?,
            },
            paths: role.paths.clone(),
        })
    }

    /// Removes keys that no delegated role references; returns the removed ids.
    pub fn purge_unused_keys(&mut self) -> Vec<KeyId> {
        let referenced: BTreeSet<&KeyId> =
            self.roles.iter().flat_map(|role| role.key_ids.iter()).collect();
        let unused: Vec<KeyId> =
            self.keys.keys().filter(|key_id| !referenced.contains(key_id)).cloned().collect();
        for key_id in &unused {
            self.keys.remove(key_id);
        }
        unused
    }
}

/// Looks up `key_ids` in a document key listing. Every entry must be filed
/// under the id its own material derives.
fn resolve_keys(
    listing: &BTreeMap<KeyId, PublicKey>,
    role: &RoleName,
    key_ids: &[KeyId],
) -> Result<BTreeMap<KeyId, PublicKey>, MetadataError> {
    let mut keys = BTreeMap::new();
    for key_id in key_ids {
        let key = listing.get(key_id).ok_or_else(|| MetadataError::UnknownKey {
            role: role.to_string(),
            key_id: key_id.clone(),
        })?;
        let derived = key.id();
        if &derived != key_id {
            return Err(MetadataError::KeyIdMismatch {
                listed: key_id.clone(),
                derived,
            });
        }
        keys.insert(derived, key.clone());
    }
    Ok(keys)
}

/// Targets document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsMeta {
    /// Type tag.
    #[serde(rename = "_type")]
    pub kind: DocumentKind,
    /// Document version.
    pub version: u64,
    /// Expiry.
    pub expires: Timestamp,
    /// Target name to file meta.
    pub targets: BTreeMap<String, FileMeta>,
    /// Delegations made by this role.
    #[serde(default)]
    pub delegations: Delegations,
}

impl_document!(TargetsMeta, DocumentKind::Targets);

impl TargetsMeta {
    /// Creates an empty version-0 targets body.
    #[must_use]
    pub const fn new(expires: Timestamp) -> Self {
        Self {
            kind: DocumentKind::Targets,
            version: 0,
            expires,
            targets: BTreeMap::new(),
            delegations: Delegations {
                keys: BTreeMap::new(),
                roles: Vec::new(),
            },
        }
    }
}

// ============================================================================
// SECTION: Snapshot and Timestamp
// ============================================================================

/// Snapshot document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Type tag.
    #[serde(rename = "_type")]
    pub kind: DocumentKind,
    /// Document version.
    pub version: u64,
    /// Expiry.
    pub expires: Timestamp,
    /// File meta of every other current role document.
    pub meta: BTreeMap<RoleName, FileMeta>,
}

impl_document!(SnapshotMeta, DocumentKind::Snapshot);

impl SnapshotMeta {
    /// Creates a version-0 snapshot skeleton.
    #[must_use]
    pub const fn new(expires: Timestamp) -> Self {
        Self {
            kind: DocumentKind::Snapshot,
            version: 0,
            expires,
            meta: BTreeMap::new(),
        }
    }
}

/// Timestamp document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMeta {
    /// Type tag.
    #[serde(rename = "_type")]
    pub kind: DocumentKind,
    /// Document version.
    pub version: u64,
    /// Expiry.
    pub expires: Timestamp,
    /// File meta of the current snapshot.
    pub meta: BTreeMap<RoleName, FileMeta>,
}

impl_document!(TimestampMeta, DocumentKind::Timestamp);

impl TimestampMeta {
    /// Creates a version-0 timestamp skeleton.
    #[must_use]
    pub const fn new(expires: Timestamp) -> Self {
        Self {
            kind: DocumentKind::Timestamp,
            version: 0,
            expires,
            meta: BTreeMap::new(),
        }
    }

    /// Returns the recorded snapshot file meta.
    #[must_use]
    pub fn snapshot_meta(&self) -> Option<&FileMeta> {
        self.meta.get(&RoleName::Snapshot)
    }
}

// ============================================================================
// SECTION: Meta Updates
// ============================================================================

/// One versioned write of a serialized signed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaUpdate {
    /// Role the document belongs to.
    pub role: RoleName,
    /// Document version.
    pub version: u64,
    /// Canonical document bytes.
    pub data: Vec<u8>,
}

impl MetaUpdate {
    /// Encodes a signed document as an update for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Encode`] when canonicalization fails.
    pub fn from_signed<T: Document>(role: RoleName, document: &Signed<T>) -> Result<Self, MetadataError> {
        Ok(Self {
            role,
            version: document.version(),
            data: document.encode()?,
        })
    }
}
