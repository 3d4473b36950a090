// crates/signet-core/src/lib.rs
// ============================================================================
// Module: Signet Core Library
// Description: Public API surface for the Signet trust-metadata engine.
// Purpose: Expose role model, documents, interfaces, and runtime protocols.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Signet maintains TUF-style signed metadata for namespaces: a root that
//! binds keys to roles, targets documents with nested path-scoped
//! delegations, and snapshot and timestamp documents that anchor consistency
//! and freshness. The engine is storage- and key-custody-agnostic and talks
//! to its backends only through [`MetaStore`] and [`CryptoService`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use interfaces::Change;
pub use interfaces::CryptoError;
pub use interfaces::CryptoService;
pub use interfaces::MetaStore;
pub use interfaces::SignError;
pub use interfaces::StoreError;
pub use interfaces::TrustPinError;
pub use interfaces::TrustPinning;
pub use runtime::ErrorClass;
pub use runtime::InMemoryCryptoService;
pub use runtime::InMemoryMetaStore;
pub use runtime::KeyRotation;
pub use runtime::PublishError;
pub use runtime::Publisher;
pub use runtime::RepoError;
pub use runtime::RotationError;
pub use runtime::RuntimeSettings;
pub use runtime::SharedCryptoService;
pub use runtime::SharedMetaStore;
pub use runtime::SnapshotError;
pub use runtime::SnapshotManager;
pub use runtime::TargetEntry;
pub use runtime::TimestampManager;
pub use runtime::TrustPinConfig;
pub use runtime::TrustRepo;
pub use runtime::TrustServices;
pub use runtime::check_batch;
pub use runtime::check_next_version;
