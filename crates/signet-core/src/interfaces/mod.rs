// crates/signet-core/src/interfaces/mod.rs
// ============================================================================
// Module: Signet Interfaces
// Description: Collaborator traits for key custody, metadata storage, and pinning.
// Purpose: Define the seams between the trust engine and its backends.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! The trust engine never touches disks, networks, or key stores directly.
//! It consumes a [`CryptoService`] for key custody and signing, a
//! [`MetaStore`] for versioned metadata, and a [`TrustPinning`] policy for
//! accepting freshly fetched roots. Implementations must be safe to share
//! across threads when wrapped in `Arc`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::CallContext;
use crate::core::Gun;
use crate::core::Interrupted;
use crate::core::KeyAlgorithm;
use crate::core::KeyId;
use crate::core::MetaUpdate;
use crate::core::PrivateKey;
use crate::core::PublicKey;
use crate::core::RoleName;
use crate::core::Signature;
use crate::core::SignedRoot;

// ============================================================================
// SECTION: Crypto Service
// ============================================================================

/// Key custody errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The service does not hold the key.
    #[error("key not found: {0}")]
    KeyNotFound(KeyId),
    /// The algorithm is not supported by this service.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The key store could not be reached in time.
    #[error("key store unavailable: {0}")]
    Unavailable(String),
    /// The key store reported an error.
    #[error("key store error: {0}")]
    Backend(String),
}

impl From<Interrupted> for CryptoError {
    fn from(err: Interrupted) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors raised while producing signatures for a role.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    /// Fewer accessible keys than the role threshold.
    #[error("role {role} needs {threshold} signing keys, {available} available")]
    KeyNotFound {
        /// Role name.
        role: String,
        /// Signatures required.
        threshold: u32,
        /// Keys the service could sign with.
        available: usize,
    },
    /// Signing timed out, was cancelled, or the key store is unreachable.
    #[error("signing unavailable: {0}")]
    Unavailable(String),
    /// The key store failed for another reason.
    #[error("signing failed: {0}")]
    Crypto(String),
}

/// Key custody and signing backend.
///
/// # Invariants
/// - Private key material never leaves the service except through
///   [`CryptoService::get_private_key`] handles.
pub trait CryptoService {
    /// Creates a key pair for `role` in namespace `gun`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the algorithm is unsupported or the key store fails.
    fn create(
        &self,
        role: &RoleName,
        gun: &Gun,
        algorithm: KeyAlgorithm,
    ) -> Result<PublicKey, CryptoError>;

    /// Imports an existing private key for `role` in namespace `gun`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the key store fails.
    fn add_key(&self, role: &RoleName, gun: &Gun, key: PrivateKey) -> Result<(), CryptoError>;

    /// Returns the public key for `key_id`, if held.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the key store fails.
    fn get_key(&self, key_id: &KeyId) -> Result<Option<PublicKey>, CryptoError>;

    /// Returns the private key handle and its role.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyNotFound`] when the key is not held.
    fn get_private_key(&self, key_id: &KeyId) -> Result<(PrivateKey, RoleName), CryptoError>;

    /// Removes a key; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the key store fails.
    fn remove_key(&self, key_id: &KeyId) -> Result<(), CryptoError>;

    /// Lists key ids held for `role` in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the key store fails.
    fn list_keys(&self, role: &RoleName) -> Result<Vec<KeyId>, CryptoError>;

    /// Lists every held key id with its role.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the key store fails.
    fn list_all_keys(&self) -> Result<BTreeMap<KeyId, RoleName>, CryptoError>;

    /// Returns true when the key lives on a hardware token.
    fn is_hardware_backed(&self, _key_id: &KeyId) -> bool {
        false
    }

    /// Signs `payload` with `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyNotFound`] when the key is not held and
    /// [`CryptoError::Unavailable`] when `ctx` is cancelled or expires.
    fn sign(
        &self,
        key_id: &KeyId,
        payload: &[u8],
        ctx: &CallContext,
    ) -> Result<Signature, CryptoError>;
}

// ============================================================================
// SECTION: Metadata Store
// ============================================================================

/// Metadata store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("metadata store io error: {0}")]
    Io(String),
    /// Stored data fails integrity checks.
    #[error("metadata store corruption: {0}")]
    Corrupt(String),
    /// Another writer already committed this or a later version.
    #[error("version conflict for {gun}/{role}: attempted {attempted}, current {current}")]
    VersionConflict {
        /// Namespace.
        gun: Gun,
        /// Role name.
        role: String,
        /// Version the caller tried to write.
        attempted: u64,
        /// Latest committed version.
        current: u64,
    },
    /// The write is malformed (gap in versions, duplicate role, bad input).
    #[error("metadata store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("metadata store error: {0}")]
    Store(String),
}

/// One committed timestamp, as recorded by the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Monotonic change identifier.
    pub id: u64,
    /// Namespace the timestamp belongs to.
    pub gun: Gun,
    /// Timestamp version.
    pub version: u64,
    /// SHA-256 of the timestamp bytes.
    pub checksum: String,
    /// Commit time in unix milliseconds.
    pub recorded_at_ms: i64,
}

/// Versioned metadata persistence.
///
/// # Invariants
/// - Per `(gun, role)`, committed versions start at 1 and increase by exactly
///   one per write.
/// - `update_current` is a compare-and-swap on the version number.
pub trait MetaStore {
    /// Returns the latest bytes for `(gun, role)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_current(&self, gun: &Gun, role: &RoleName) -> Result<Option<Vec<u8>>, StoreError>;

    /// Commits one update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when the version was already
    /// taken and [`StoreError::Invalid`] when it would leave a gap.
    fn update_current(&self, gun: &Gun, update: MetaUpdate) -> Result<(), StoreError>;

    /// Commits several updates atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any update is rejected; nothing is committed then.
    fn update_many(&self, gun: &Gun, updates: Vec<MetaUpdate>) -> Result<(), StoreError>;

    /// Returns the historical version whose SHA-256 is `checksum`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_checksum(
        &self,
        gun: &Gun,
        role: &RoleName,
        checksum: &str,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns a specific historical version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_version(
        &self,
        gun: &Gun,
        role: &RoleName,
        version: u64,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Removes every document for `gun`; deleting an unknown namespace succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when deletion fails.
    fn delete(&self, gun: &Gun) -> Result<(), StoreError>;

    /// Pages the change feed: up to `limit` changes with `id > after`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn changes(
        &self,
        after: u64,
        limit: usize,
        gun_filter: Option<&Gun>,
    ) -> Result<Vec<Change>, StoreError>;

    /// Checks store readiness for serving requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is not ready.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Trust Pinning
// ============================================================================

/// Trust pinning errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustPinError {
    /// The root is not signed by an acceptable key.
    #[error("trust pin rejected root for {gun}: {reason}")]
    Rejected {
        /// Namespace.
        gun: Gun,
        /// Human-readable reason.
        reason: String,
    },
    /// The pinning policy itself is malformed.
    #[error("invalid trust pin configuration: {0}")]
    Invalid(String),
}

/// Policy deciding whether a fetched root's keys are acceptable.
pub trait TrustPinning {
    /// Accepts or rejects `root` for namespace `gun`.
    ///
    /// # Errors
    ///
    /// Returns [`TrustPinError::Rejected`] when the root must not be trusted.
    fn check_root(&self, gun: &Gun, root: &SignedRoot) -> Result<(), TrustPinError>;
}
