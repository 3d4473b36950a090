// crates/signet-core/src/runtime/crypto.rs
// ============================================================================
// Module: Signet In-Memory Crypto Service
// Description: Process-local key custody for tests and single-node deployments.
// Purpose: Provide a deterministic CryptoService without external key stores.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryCryptoService`] holds Ed25519 keys in a mutex-protected list
//! that preserves discovery (insertion) order. Keys may be flagged as
//! hardware-backed to model token-resident keys in selection logic.
//! [`SharedCryptoService`] wraps any implementation behind an `Arc`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::CallContext;
use crate::core::Gun;
use crate::core::KeyAlgorithm;
use crate::core::KeyId;
use crate::core::PrivateKey;
use crate::core::PublicKey;
use crate::core::RoleName;
use crate::core::Signature;
use crate::interfaces::CryptoError;
use crate::interfaces::CryptoService;

// ============================================================================
// SECTION: In-Memory Service
// ============================================================================

/// One held key.
#[derive(Debug, Clone)]
struct HeldKey {
    /// Private key handle.
    key: PrivateKey,
    /// Role the key was created for.
    role: RoleName,
    /// Namespace the key was created for.
    gun: Gun,
    /// Whether the key models a hardware token.
    hardware: bool,
}

/// In-memory crypto service.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCryptoService {
    /// Held keys in discovery order.
    keys: Arc<Mutex<Vec<HeldKey>>>,
}

impl InMemoryCryptoService {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports a key flagged as hardware-backed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Backend`] when the key list is unavailable.
    pub fn add_hardware_key(&self, role: &RoleName, gun: &Gun, key: PrivateKey) -> Result<(), CryptoError> {
        self.insert(role, gun, key, true)
    }

    /// Returns the namespace a key was created for.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Backend`] when the key list is unavailable.
    pub fn key_namespace(&self, key_id: &KeyId) -> Result<Option<Gun>, CryptoError> {
        let guard = self.lock()?;
        Ok(guard.iter().find(|held| &held.key.id() == key_id).map(|held| held.gun.clone()))
    }

    /// Locks the key list.
    fn lock(&self) -> Result<MutexGuard<'_, Vec<HeldKey>>, CryptoError> {
        self.keys
            .lock()
            .map_err(|_| CryptoError::Backend("crypto service mutex poisoned".to_string()))
    }

    /// Inserts or replaces a key.
    fn insert(&self, role: &RoleName, gun: &Gun, key: PrivateKey, hardware: bool) -> Result<(), CryptoError> {
        let mut guard = self.lock()?;
        let key_id = key.id();
        guard.retain(|held| held.key.id() != key_id);
        guard.push(HeldKey {
            key,
            role: role.clone(),
            gun: gun.clone(),
            hardware,
        });
        Ok(())
    }
}

impl CryptoService for InMemoryCryptoService {
    fn create(
        &self,
        role: &RoleName,
        gun: &Gun,
        algorithm: KeyAlgorithm,
    ) -> Result<PublicKey, CryptoError> {
        let key = match algorithm {
            KeyAlgorithm::Ed25519 => {
                PrivateKey::generate_ed25519().map_err(|err| CryptoError::Backend(err.to_string()))?
            }
            other => return Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        };
        let public = key.public_key().clone();
        self.insert(role, gun, key, false)?;
        Ok(public)
    }

    fn add_key(&self, role: &RoleName, gun: &Gun, key: PrivateKey) -> Result<(), CryptoError> {
        self.insert(role, gun, key, false)
    }

    fn get_key(&self, key_id: &KeyId) -> Result<Option<PublicKey>, CryptoError> {
        let guard = self.lock()?;
        Ok(guard
            .iter()
            .find(|held| &held.key.id() == key_id)
            .map(|held| held.key.public_key().clone()))
    }

    fn get_private_key(&self, key_id: &KeyId) -> Result<(PrivateKey, RoleName), CryptoError> {
        let guard = self.lock()?;
        guard
            .iter()
            .find(|held| &held.key.id() == key_id)
            .map(|held| (held.key.clone(), held.role.clone()))
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.clone()))
    }

    fn remove_key(&self, key_id: &KeyId) -> Result<(), CryptoError> {
        let mut guard = self.lock()?;
        guard.retain(|held| &held.key.id() != key_id);
        Ok(())
    }

    fn list_keys(&self, role: &RoleName) -> Result<Vec<KeyId>, CryptoError> {
        let guard = self.lock()?;
        Ok(guard.iter().filter(|held| &held.role == role).map(|held| held.key.id()).collect())
    }

    fn list_all_keys(&self) -> Result<BTreeMap<KeyId, RoleName>, CryptoError> {
        let guard = self.lock()?;
        Ok(guard.iter().map(|held| (held.key.id(), held.role.clone())).collect())
    }

    fn is_hardware_backed(&self, key_id: &KeyId) -> bool {
        self.lock()
            .map(|guard| guard.iter().any(|held| held.hardware && &held.key.id() == key_id))
            .unwrap_or(false)
    }

    fn sign(
        &self,
        key_id: &KeyId,
        payload: &[u8],
        ctx: &CallContext,
    ) -> Result<Signature, CryptoError> {
        ctx.check()?;
        let key = {
            let guard = self.lock()?;
            guard
                .iter()
                .find(|held| &held.key.id() == key_id)
                .map(|held| held.key.clone())
                .ok_or_else(|| CryptoError::KeyNotFound(key_id.clone()))?
        };
        Ok(Signature {
            key_id: key.id(),
            method: key.algorithm().signature_method(),
            signature: key.sign(payload),
            is_valid: false,
        })
    }
}

// ============================================================================
// SECTION: Shared Service Wrapper
// ============================================================================

/// Shared crypto service backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedCryptoService {
    /// Inner service implementation.
    inner: Arc<dyn CryptoService + Send + Sync>,
}

impl SharedCryptoService {
    /// Wraps a crypto service in a shared, clonable wrapper.
    #[must_use]
    pub fn from_service(service: impl CryptoService + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    /// Wraps an existing shared service.
    #[must_use]
    pub const fn new(service: Arc<dyn CryptoService + Send + Sync>) -> Self {
        Self {
            inner: service,
        }
    }
}

impl CryptoService for SharedCryptoService {
    fn create(
        &self,
        role: &RoleName,
        gun: &Gun,
        algorithm: KeyAlgorithm,
    ) -> Result<PublicKey, CryptoError> {
        self.inner.create(role, gun, algorithm)
    }

    fn add_key(&self, role: &RoleName, gun: &Gun, key: PrivateKey) -> Result<(), CryptoError> {
        self.inner.add_key(role, gun, key)
    }

    fn get_key(&self, key_id: &KeyId) -> Result<Option<PublicKey>, CryptoError> {
        self.inner.get_key(key_id)
    }

    fn get_private_key(&self, key_id: &KeyId) -> Result<(PrivateKey, RoleName), CryptoError> {
        self.inner.get_private_key(key_id)
    }

    fn remove_key(&self, key_id: &KeyId) -> Result<(), CryptoError> {
        self.inner.remove_key(key_id)
    }

    fn list_keys(&self, role: &RoleName) -> Result<Vec<KeyId>, CryptoError> {
        self.inner.list_keys(role)
    }

    fn list_all_keys(&self) -> Result<BTreeMap<KeyId, RoleName>, CryptoError> {
        self.inner.list_all_keys()
    }

    fn is_hardware_backed(&self, key_id: &KeyId) -> bool {
        self.inner.is_hardware_backed(key_id)
    }

    fn sign(
        &self,
        key_id: &KeyId,
        payload: &[u8],
        ctx: &CallContext,
    ) -> Result<Signature, CryptoError> {
        self.inner.sign(key_id, payload, ctx)
    }
}
