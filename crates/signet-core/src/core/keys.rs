// crates/signet-core/src/core/keys.rs
// ============================================================================
// Module: Signet Key Material
// Description: Public key records, opaque private key handles, and key ids.
// Purpose: Give every signing key a stable identifier and a redacted handle.
// Dependencies: base64, ed25519-dalek, rand, serde
// ============================================================================

//! ## Overview
//! A [`PublicKey`] is the algorithm label plus raw public bytes; its
//! [`KeyId`] is the lowercase hex SHA-256 of the canonical JSON object
//! `{"algorithm":..,"public":<base64>}`. [`PrivateKey`] handles never
//! serialize and print as redacted.
//!
//! Only Ed25519 keys can be generated or used for signing in-process; ECDSA
//! and RSA public keys may still appear in decoded metadata.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::KeyId;

// ============================================================================
// SECTION: Algorithms
// ============================================================================

/// Public key algorithms that may appear in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// Ed25519 keys.
    Ed25519,
    /// ECDSA P-256 keys.
    Ecdsa,
    /// RSA keys.
    Rsa,
}

impl KeyAlgorithm {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Ecdsa => "ecdsa",
            Self::Rsa => "rsa",
        }
    }

    /// Returns the signature method paired with this key algorithm.
    #[must_use]
    pub const fn signature_method(self) -> SignatureMethod {
        match self {
            Self::Ed25519 => SignatureMethod::Ed25519,
            Self::Ecdsa => SignatureMethod::Ecdsa,
            Self::Rsa => SignatureMethod::RsaPss,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature methods recorded alongside signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMethod {
    /// Ed25519 signatures.
    Ed25519,
    /// ECDSA signatures.
    Ecdsa,
    /// RSASSA-PSS signatures.
    #[serde(rename = "rsapss")]
    RsaPss,
}

// ============================================================================
// SECTION: Public Keys
// ============================================================================

/// Wire form of a public key; its canonical JSON is the key id preimage.
#[derive(Serialize, Deserialize)]
struct PublicKeyRecord {
    /// Key algorithm.
    algorithm: KeyAlgorithm,
    /// Base64 public bytes.
    public: String,
}

impl PublicKeyRecord {
    /// Builds the record for raw key material.
    fn of(algorithm: KeyAlgorithm, public: &[u8]) -> Self {
        Self {
            algorithm,
            public: Base64.encode(public),
        }
    }
}

/// Public half of a signing key.
///
/// # Invariants
/// - `id` is always derived from `algorithm` and `public`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRecord", into = "PublicKeyRecord")]
pub struct PublicKey {
    /// Key algorithm.
    algorithm: KeyAlgorithm,
    /// Raw public bytes.
    public: Vec<u8>,
    /// Derived identifier.
    id: KeyId,
}

impl PublicKey {
    /// Creates a public key and derives its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the key record cannot be canonicalized.
    pub fn new(algorithm: KeyAlgorithm, public: Vec<u8>) -> Result<Self, HashError> {
        let id = KeyId::new(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &PublicKeyRecord::of(algorithm, &public))?);
        Ok(Self {
            algorithm,
            public,
            id,
        })
    }

    /// Returns the key algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Returns the raw public bytes.
    #[must_use]
    pub fn public_bytes(&self) -> &[u8] {
        &self.public
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn id(&self) -> KeyId {
        self.id.clone()
    }

    /// Returns the canonical JSON bytes the identifier is computed over.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the key record cannot be canonicalized.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, HashError> {
        canonical_json_bytes(&PublicKeyRecord::of(self.algorithm, &self.public))
    }
}

impl TryFrom<PublicKeyRecord> for PublicKey {
    type Error = String;

    fn try_from(record: PublicKeyRecord) -> Result<Self, Self::Error> {
        let public = Base64
            .decode(record.public.as_bytes())
            .map_err(|err| format!("invalid base64 public key: {err}"))?;
        if public.is_empty() {
            return Err("public key bytes must not be empty".to_string());
        }
        Self::new(record.algorithm, public).map_err(|err| err.to_string())
    }
}

impl From<PublicKey> for PublicKeyRecord {
    fn from(key: PublicKey) -> Self {
        Self::of(key.algorithm, &key.public)
    }
}

// ============================================================================
// SECTION: Private Keys
// ============================================================================

/// Backend-specific private key material.
#[derive(Clone)]
enum PrivateKeyMaterial {
    /// Ed25519 signing key.
    Ed25519(SigningKey),
}

/// Opaque private key handle.
///
/// # Invariants
/// - Never serialized; `Debug` output omits key material.
#[derive(Clone)]
pub struct PrivateKey {
    /// Key material.
    material: PrivateKeyMaterial,
    /// Matching public key.
    public: PublicKey,
}

impl PrivateKey {
    /// Generates a fresh Ed25519 key from the operating system RNG.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the key id cannot be derived.
    pub fn generate_ed25519() -> Result<Self, HashError> {
        let mut seed = [0_u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::ed25519_from_seed(&seed)
    }

    /// Builds an Ed25519 key from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the key id cannot be derived.
    pub fn ed25519_from_seed(seed: &[u8; 32]) -> Result<Self, HashError> {
        let signing = SigningKey::from_bytes(seed);
        let public = PublicKey::new(KeyAlgorithm::Ed25519, signing.verifying_key().to_bytes().to_vec())?;
        Ok(Self {
            material: PrivateKeyMaterial::Ed25519(signing),
            public,
        })
    }

    /// Returns the public half.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn id(&self) -> KeyId {
        self.public.id()
    }

    /// Returns the key algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.public.algorithm()
    }

    /// Signs `payload`, returning raw signature bytes.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match &self.material {
            PrivateKeyMaterial::Ed25519(signing) => signing.sign(payload).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("id", &self.public.id)
            .field("algorithm", &self.public.algorithm)
            .field("material", &"<redacted>")
            .finish()
    }
}
