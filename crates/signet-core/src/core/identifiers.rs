// crates/signet-core/src/core/identifiers.rs
// ============================================================================
// Module: Signet Identifiers
// Description: Opaque identifiers for trust namespaces and signing keys.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Namespaces ("GUNs", globally unique names) and key identifiers serialize as
//! plain strings. Neither type normalizes its contents; key identifiers are
//! derived from public key material in [`crate::core::keys`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Globally unique name of one trust repository (for example `example.com/app`).
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gun(String);

impl Gun {
    /// Creates a new namespace identifier.
    #[must_use]
    pub fn new(gun: impl Into<String>) -> Self {
        Self(gun.into())
    }

    /// Returns the namespace as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Gun {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Gun {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Identifier of a public key (lowercase hex SHA-256 of its canonical form).
///
/// # Invariants
/// - Opaque UTF-8 string; values produced by [`crate::PublicKey::id`] are
///   64 lowercase hex characters, but decoded values are not re-checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Creates a new key identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
