// crates/signet-core/src/runtime/mod.rs
// ============================================================================
// Module: Signet Runtime
// Description: Trust repository, get-or-create protocols, rotation, and publish.
// Purpose: Drive signed metadata through the injected store and crypto service.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules hold the stateful protocols: the per-namespace
//! [`TrustRepo`] working set, snapshot and timestamp get-or-create, key
//! rotation, and the publish-time API. In-memory collaborators and audit
//! sinks live here too so tests and single-node deployments need nothing
//! external.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
mod bootstrap;
pub mod crypto;
pub mod pinning;
pub mod publisher;
pub mod repo;
pub mod rotation;
pub mod services;
pub mod snapshot;
pub mod store;
pub mod timestamp;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::TrustAuditEvent;
pub use audit::TrustAuditEventParams;
pub use audit::TrustAuditKind;
pub use audit::TrustAuditSink;
pub use crypto::InMemoryCryptoService;
pub use crypto::SharedCryptoService;
pub use pinning::TrustPinConfig;
pub use publisher::PublishError;
pub use publisher::Publisher;
pub use repo::DEFAULT_DELEGATION_THRESHOLD;
pub use repo::RepoError;
pub use repo::TargetEntry;
pub use repo::TrustRepo;
pub use rotation::KeyRotation;
pub use rotation::RotationError;
pub use services::DEFAULT_MAX_RETRIES;
pub use services::DEFAULT_SIGNING_TIMEOUT;
pub use services::ErrorClass;
pub use services::LoadError;
pub use services::RepoState;
pub use services::RuntimeSettings;
pub use services::TrustServices;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotManager;
pub use store::InMemoryMetaStore;
pub use store::SharedMetaStore;
pub use store::check_batch;
pub use store::check_next_version;
pub use timestamp::TimestampManager;
