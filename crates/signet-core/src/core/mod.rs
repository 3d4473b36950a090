// crates/signet-core/src/core/mod.rs
// ============================================================================
// Module: Signet Core Types
// Description: Role model, key material, and signed trust metadata.
// Purpose: Provide pure, I/O-free types shared by every runtime component.
// Dependencies: base64, ed25519-dalek, serde, serde_jcs, sha2, time
// ============================================================================

//! ## Overview
//! Core types describe roles, delegation paths, keys, and the four signed
//! document kinds. Nothing here performs I/O; the runtime combines these
//! types with the collaborator interfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod context;
pub mod hashing;
pub mod identifiers;
pub mod keys;
pub mod metadata;
pub mod roles;
pub mod time;
pub mod verify;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::CallContext;
pub use context::Interrupted;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashError;
pub use hashing::sha256_hex;
pub use identifiers::Gun;
pub use identifiers::KeyId;
pub use keys::KeyAlgorithm;
pub use keys::PrivateKey;
pub use keys::PublicKey;
pub use keys::SignatureMethod;
pub use metadata::Delegations;
pub use metadata::Document;
pub use metadata::DocumentKind;
pub use metadata::FileMeta;
pub use metadata::MetaUpdate;
pub use metadata::MetadataError;
pub use metadata::RootMeta;
pub use metadata::RootRole;
pub use metadata::Signature;
pub use metadata::Signed;
pub use metadata::SignedRoot;
pub use metadata::SignedSnapshot;
pub use metadata::SignedTargets;
pub use metadata::SignedTimestamp;
pub use metadata::SnapshotMeta;
pub use metadata::TargetsMeta;
pub use metadata::TimestampMeta;
pub use roles::BaseRole;
pub use roles::DelegationPath;
pub use roles::DelegationRole;
pub use roles::Role;
pub use roles::RoleError;
pub use roles::RoleName;
pub use roles::is_base_role;
pub use roles::is_delegation;
pub use roles::is_valid_path_grant;
pub use roles::is_valid_role_name;
pub use roles::is_wild_delegation;
pub use roles::validate_role;
pub use time::Clock;
pub use time::ExpiryPolicy;
pub use time::FixedClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use verify::VerifyError;
pub use verify::verify_signed;
