// crates/signet-core/src/runtime/services.rs
// ============================================================================
// Module: Signet Runtime Services
// Description: Collaborator bundle, runtime settings, and error classification.
// Purpose: Share store, crypto, clock, and audit handles across managers.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! [`TrustServices`] bundles the injected collaborators every runtime manager
//! needs. It loads a namespace's documents into a fresh [`TrustRepo`] and runs
//! optimistic retries: a version conflict from the store re-runs the whole
//! read-sign-write sequence, up to the configured retry budget.
//!
//! Errors are grouped into an [`ErrorClass`] so callers can decide between
//! fixing input, aborting, retrying later, or re-reading.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::CallContext;
use crate::core::Clock;
use crate::core::ExpiryPolicy;
use crate::core::Gun;
use crate::core::Interrupted;
use crate::core::KeyAlgorithm;
use crate::core::RoleName;
use crate::core::SignedSnapshot;
use crate::core::SignedTimestamp;
use crate::core::SystemClock;
use crate::core::Timestamp;
use crate::interfaces::CryptoError;
use crate::interfaces::MetaStore;
use crate::interfaces::SignError;
use crate::interfaces::StoreError;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::TrustAuditEvent;
use crate::runtime::audit::TrustAuditSink;
use crate::runtime::crypto::SharedCryptoService;
use crate::runtime::repo::RepoError;
use crate::runtime::repo::TrustRepo;
use crate::runtime::store::SharedMetaStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on one signing pass.
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of optimistic retries after a version conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

// ============================================================================
// SECTION: Error Classes
// ============================================================================

/// How a caller should react to a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-correctable input; never retried automatically.
    Validation,
    /// Trust or integrity failure; fatal for the operation.
    Integrity,
    /// Key store or metadata store unavailable; may be retried with backoff.
    Availability,
    /// Another writer won the version race; re-read and retry.
    Conflict,
}

impl StoreError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::VersionConflict {
                ..
            } => ErrorClass::Conflict,
            Self::Corrupt(_) => ErrorClass::Integrity,
            Self::Invalid(_) => ErrorClass::Validation,
            Self::Io(_) | Self::Store(_) => ErrorClass::Availability,
        }
    }
}

impl CryptoError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedAlgorithm(_) => ErrorClass::Validation,
            Self::KeyNotFound(_) | Self::Unavailable(_) | Self::Backend(_) => {
                ErrorClass::Availability
            }
        }
    }
}

impl RepoError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NoRootLoaded
            | Self::RoleNotFound(_)
            | Self::InvalidTarget {
                ..
            }
            | Self::TargetOutsidePaths {
                ..
            }
            | Self::Role(_) => ErrorClass::Validation,
            Self::Sign(SignError::KeyNotFound {
                ..
            }
            | SignError::Unavailable(_)
            | SignError::Crypto(_)) => ErrorClass::Availability,
            Self::Metadata(_) | Self::Verify(_) | Self::TrustPin(_) => ErrorClass::Integrity,
        }
    }
}

// ============================================================================
// SECTION: Load Errors
// ============================================================================

/// Errors raised while loading a namespace from the store.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A stored document does not decode.
    #[error("corrupt {role} metadata for {gun}: {reason}")]
    Corrupt {
        /// Namespace.
        gun: Gun,
        /// Role whose document is corrupt.
        role: String,
        /// Decoder message.
        reason: String,
    },
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoadError {
    /// Builds a corruption error for `role`.
    pub(crate) fn corrupt(gun: &Gun, role: &RoleName, reason: impl ToString) -> Self {
        Self::Corrupt {
            gun: gun.clone(),
            role: role.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors that may signal a lost version race.
pub(crate) trait Retryable {
    /// Returns true when the operation should be re-run from a fresh read.
    fn is_conflict(&self) -> bool;
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Runtime knobs shared by every manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Per-role document lifetimes.
    pub expiry: ExpiryPolicy,
    /// Bound on one signing pass.
    pub signing_timeout: Duration,
    /// Optimistic retries after a version conflict.
    pub max_retries: u32,
    /// Algorithm used when keys are created.
    pub default_algorithm: KeyAlgorithm,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            expiry: ExpiryPolicy::default(),
            signing_timeout: DEFAULT_SIGNING_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            default_algorithm: KeyAlgorithm::Ed25519,
        }
    }
}

// ============================================================================
// SECTION: Services
// ============================================================================

/// Repository load result.
pub enum RepoState<'a> {
    /// The namespace has a root; documents are loaded.
    Initialized(TrustRepo<'a>),
    /// The namespace has no root yet.
    NotInitialized,
}

/// Collaborators shared by the runtime managers.
#[derive(Clone)]
pub struct TrustServices {
    /// Metadata store.
    pub store: SharedMetaStore,
    /// Key custody backend.
    pub crypto: SharedCryptoService,
    /// Time source for expiry decisions.
    pub clock: Arc<dyn Clock>,
    /// Audit sink for state transitions.
    pub audit: Arc<dyn TrustAuditSink>,
    /// Runtime settings.
    pub settings: RuntimeSettings,
}

impl TrustServices {
    /// Creates services with the system clock, no audit sink, and default settings.
    #[must_use]
    pub fn new(store: SharedMetaStore, crypto: SharedCryptoService) -> Self {
        Self {
            store,
            crypto,
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
            settings: RuntimeSettings::default(),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn TrustAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the runtime settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Returns the expiry for a document of `role` signed now.
    #[must_use]
    pub fn expires_for(&self, role: &RoleName) -> Timestamp {
        self.settings.expiry.expires_for(role, self.now())
    }

    /// Creates an empty working set bound to these services.
    #[must_use]
    pub fn repo(&self, gun: &Gun) -> TrustRepo<'_> {
        TrustRepo::new(gun.clone(), &self.crypto).with_signing_timeout(self.settings.signing_timeout)
    }

    /// Loads root, the reachable targets tree, snapshot, and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Corrupt`] when a stored document does not decode
    /// and [`LoadError::Store`] when the store fails.
    pub fn load_repo(&self, gun: &Gun) -> Result<RepoState<'_>, LoadError> {
        let Some(root_bytes) = self.store.get_current(gun, &RoleName::Root)? else {
            return Ok(RepoState::NotInitialized);
        };
        let mut repo = self.repo(gun);
        repo.load_root(&root_bytes).map_err(|err| LoadError::corrupt(gun, &RoleName::Root, err))?;
        let mut pending = vec![RoleName::Targets];
        while let Some(role) = pending.pop() {
            let Some(bytes) = self.store.get_current(gun, &role)? else {
                continue;
            };
            repo.load_targets(role.clone(), &bytes).map_err(|err| LoadError::corrupt(gun, &role, err))?;
            if let Some(document) = repo.targets(&role) {
                let children = document
                    .signed
                    .delegations
                    .roles
                    .iter()
                    .rev()
                    .filter(|child| child.name.parent().as_ref() == Some(&role))
                    .map(|child| child.name.clone());
                pending.extend(children);
            }
        }
        if let Some(bytes) = self.store.get_current(gun, &RoleName::Snapshot)? {
            let snapshot = SignedSnapshot::decode(&bytes)
                .map_err(|err| LoadError::corrupt(gun, &RoleName::Snapshot, err))?;
            repo.set_snapshot(snapshot);
        }
        if let Some(bytes) = self.store.get_current(gun, &RoleName::Timestamp)? {
            let timestamp = SignedTimestamp::decode(&bytes)
                .map_err(|err| LoadError::corrupt(gun, &RoleName::Timestamp, err))?;
            repo.set_timestamp(timestamp);
        }
        Ok(RepoState::Initialized(repo))
    }

    /// Runs `attempt` until it succeeds, fails without a conflict, or the
    /// retry budget is spent. Each retry is audited.
    pub(crate) fn with_retries<T, E>(
        &self,
        gun: &Gun,
        ctx: &CallContext,
        mut attempt: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: Retryable + From<Interrupted>,
    {
        let mut retries: u32 = 0;
        loop {
            ctx.check()?;
            match attempt() {
                Err(err) if err.is_conflict() && retries < self.settings.max_retries => {
                    retries = retries.saturating_add(1);
                    self.audit.record(&TrustAuditEvent::retry(gun, retries));
                }
                outcome => return outcome,
            }
        }
    }
}
