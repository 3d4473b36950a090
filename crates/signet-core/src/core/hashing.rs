// crates/signet-core/src/core/hashing.rs
// ============================================================================
// Module: Signet Canonical Hashing
// Description: RFC 8785 canonical bytes and SHA-256 digests for trust metadata.
// Purpose: Give signatures, key ids, and file meta one reproducible byte form.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Three things are hashed: persisted document bytes (file meta, checksums,
//! store integrity columns), canonical document bodies (the signature
//! payload), and canonical public key records (key ids). Document bytes are
//! hashed exactly as stored; never hash a re-encoding when raw bytes exist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Hash algorithms that may label a file meta entry or a stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the stable label for the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Parses a stored label; unknown labels yield `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Hash algorithm used for new file meta, checksums, and key ids.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// The value could not be written as RFC 8785 JSON.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Canonical Bytes
// ============================================================================

/// Returns the RFC 8785 encoding of `value`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes the RFC 8785 encoding of `value`, returning lowercase hex.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<String, HashError> {
    Ok(hash_bytes(algorithm, &canonical_json_bytes(value)?))
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Hashes raw bytes, returning lowercase hex.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => lower_hex(&Sha256::digest(bytes)),
    }
}

/// Returns the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, bytes)
}

/// Renders digest bytes as lowercase hex.
fn lower_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len().saturating_mul(2));
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
