// crates/signet-core/src/runtime/pinning.rs
// ============================================================================
// Module: Signet Trust Pinning
// Description: Bundled policies for accepting freshly fetched roots.
// Purpose: Gate roots from untrusted channels before they reach a TrustRepo.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`TrustPinConfig::Tofu`] accepts any root on first use; self-signature
//! verification still runs afterwards in [`crate::runtime::TrustRepo::bootstrap_root`].
//! [`TrustPinConfig::PinnedKeys`] requires the namespace to be listed and at
//! least one pinned key to have produced a valid signature over the root.
//! Pins match the id derived from the signing key's material, never the id
//! the root files it under.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::Gun;
use crate::core::KeyId;
use crate::core::SignedRoot;
use crate::core::verify::verify_raw;
use crate::interfaces::TrustPinError;
use crate::interfaces::TrustPinning;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Trust pinning policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPinConfig {
    /// Trust on first use.
    Tofu,
    /// Root key ids pinned per namespace.
    PinnedKeys(BTreeMap<Gun, BTreeSet<KeyId>>),
}

impl TrustPinning for TrustPinConfig {
    fn check_root(&self, gun: &Gun, root: &SignedRoot) -> Result<(), TrustPinError> {
        let pins = match self {
            Self::Tofu => return Ok(()),
            Self::PinnedKeys(pins) => pins,
        };
        let pinned = pins.get(gun).ok_or_else(|| TrustPinError::Rejected {
            gun: gun.clone(),
            reason: "namespace has no pinned keys".to_string(),
        })?;
        if pinned.is_empty() {
            return Err(TrustPinError::Invalid(format!("empty pin set for {gun}")));
        }
        let payload = root
            .signed_bytes()
            .map_err(|err| TrustPinError::Invalid(err.to_string()))?;
        let pinned_signature = root.signatures.iter().any(|signature| {
            root.signed.keys.get(&signature.key_id).is_some_and(|key| {
                let derived = key.id();
                derived == signature.key_id
                    && pinned.contains(&derived)
                    && verify_raw(key, signature.method, &payload, &signature.signature)
            })
        });
        if pinned_signature {
            Ok(())
        } else {
            Err(TrustPinError::Rejected {
                gun: gun.clone(),
                reason: "root is not signed by a pinned key".to_string(),
            })
        }
    }
}
