// crates/signet-core/src/core/verify.rs
// ============================================================================
// Module: Signet Signature Verification
// Description: Threshold verification of signed documents against a role.
// Purpose: Re-verify signatures from raw canonical bytes on every check.
// Dependencies: ed25519-dalek, thiserror
// ============================================================================

//! ## Overview
//! Verification recomputes the canonical body bytes, checks each signature
//! whose key belongs to the role, refreshes the `is_valid` cache, and counts
//! distinct verified keys against the role threshold. A signature counts
//! only when its key id is the id derived from the verifying key's material.
//! Signatures by keys outside the role, with an unsupported method, or
//! repeated for the same key never add to the count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use ed25519_dalek::Signature as Ed25519Signature;
use ed25519_dalek::VerifyingKey;
use thiserror::Error;

use crate::core::identifiers::KeyId;
use crate::core::keys::KeyAlgorithm;
use crate::core::keys::PublicKey;
use crate::core::keys::SignatureMethod;
use crate::core::metadata::Document;
use crate::core::metadata::MetadataError;
use crate::core::metadata::Signature;
use crate::core::metadata::Signed;
use crate::core::roles::BaseRole;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Signature verification errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Fewer than `threshold` distinct role keys produced valid signatures.
    #[error("role {role} has {valid} valid signatures, needs {threshold}")]
    SignatureInvalid {
        /// Role name.
        role: String,
        /// Distinct keys that verified.
        valid: usize,
        /// Required signatures.
        threshold: u32,
    },
    /// Body could not be canonicalized.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a raw signature with a public key.
#[must_use]
pub fn verify_raw(key: &PublicKey, method: SignatureMethod, payload: &[u8], signature: &[u8]) -> bool {
    match (key.algorithm(), method) {
        (KeyAlgorithm::Ed25519, SignatureMethod::Ed25519) => {
            let Ok(key_bytes) = <[u8; 32]>::try_from(key.public_bytes()) else {
                return false;
            };
            let Ok(verifying) = VerifyingKey::from_bytes(&key_bytes) else {
                return false;
            };
            let Ok(signature) = Ed25519Signature::try_from(signature) else {
                return false;
            };
            verifying.verify_strict(payload, &signature).is_ok()
        }
        _ => false,
    }
}

/// Verifies `signatures` over `payload`, refreshing each `is_valid` flag, and
/// returns the number of distinct role keys that verified.
pub fn verify_signatures(payload: &[u8], signatures: &mut [Signature], role: &BaseRole) -> usize {
    let mut verified: BTreeSet<KeyId> = BTreeSet::new();
    for signature in signatures.iter_mut() {
        signature.is_valid = role.keys.get(&signature.key_id).is_some_and(|key| {
            key.id() == signature.key_id && verify_raw(key, signature.method, payload, &signature.signature)
        });
        if signature.is_valid {
            verified.insert(signature.key_id.clone());
        }
    }
    verified.len()
}

/// Verifies a signed document against `role`.
///
/// # Errors
///
/// Returns [`VerifyError::SignatureInvalid`] when fewer than `threshold`
/// distinct role keys verify and [`VerifyError::Metadata`] when the body
/// cannot be canonicalized.
pub fn verify_signed<T: Document>(document: &mut Signed<T>, role: &BaseRole) -> Result<usize, VerifyError> {
    let payload = document.signed_bytes()?;
    let valid = verify_signatures(&payload, &mut document.signatures, role);
    let enough = usize::try_from(role.threshold).is_ok_and(|needed| needed > 0 && valid >= needed);
    if !enough {
        return Err(VerifyError::SignatureInvalid {
            role: role.name.to_string(),
            valid,
            threshold: role.threshold,
        });
    }
    Ok(valid)
}
