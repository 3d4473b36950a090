// crates/signet-core/src/runtime/audit.rs
// ============================================================================
// Module: Signet Audit Logging
// Description: Structured audit events for trust metadata state transitions.
// Purpose: Emit redacted JSON-line audit records without a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Runtime components report successful state transitions (regenerations,
//! rotations, publishes) and optimistic retries to a [`TrustAuditSink`].
//! Events carry identifiers, versions, key ids, and hashes only; document
//! bodies and key material are never recorded. Failures are returned to the
//! caller, not logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::Gun;
use crate::core::KeyId;
use crate::core::RoleName;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit event labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustAuditKind {
    /// A snapshot was signed and committed.
    SnapshotRegenerated,
    /// A timestamp was signed and committed.
    TimestampRegenerated,
    /// A namespace received its first root.
    RootBootstrapped,
    /// A role's keys were replaced.
    KeyRotated,
    /// A publish committed one or more documents.
    MetadataPublished,
    /// Roles were queued for re-signature.
    RolesWitnessed,
    /// A version conflict triggered a retry.
    VersionConflictRetry,
}

impl TrustAuditKind {
    /// Returns the stable event label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SnapshotRegenerated => "snapshot_regenerated",
            Self::TimestampRegenerated => "timestamp_regenerated",
            Self::RootBootstrapped => "root_bootstrapped",
            Self::KeyRotated => "key_rotated",
            Self::MetadataPublished => "metadata_published",
            Self::RolesWitnessed => "roles_witnessed",
            Self::VersionConflictRetry => "version_conflict_retry",
        }
    }
}

/// Trust audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Namespace.
    pub gun: String,
    /// Roles affected, in commit order.
    pub roles: Vec<String>,
    /// New version of the primary document, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Key ids bound by the change.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_ids: Vec<String>,
    /// SHA-256 of the primary document bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Retry attempt number (version conflicts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

/// Inputs required to construct an audit event.
pub struct TrustAuditEventParams<'a> {
    /// Event label.
    pub kind: TrustAuditKind,
    /// Namespace.
    pub gun: &'a Gun,
    /// Roles affected.
    pub roles: Vec<RoleName>,
    /// New version of the primary document.
    pub version: Option<u64>,
    /// Key ids bound by the change.
    pub key_ids: Vec<KeyId>,
    /// SHA-256 of the primary document bytes.
    pub checksum: Option<String>,
    /// Retry attempt number.
    pub attempt: Option<u32>,
}

impl TrustAuditEvent {
    /// Creates an audit event stamped with the current wall-clock time.
    #[must_use]
    pub fn new(params: TrustAuditEventParams<'_>) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: params.kind.as_str(),
            timestamp_ms,
            gun: params.gun.to_string(),
            roles: params.roles.iter().map(ToString::to_string).collect(),
            version: params.version,
            key_ids: params.key_ids.iter().map(ToString::to_string).collect(),
            checksum: params.checksum,
            attempt: params.attempt,
        }
    }

    /// Builds an event for one freshly committed document.
    #[must_use]
    pub fn document(kind: TrustAuditKind, gun: &Gun, role: RoleName, version: u64, checksum: String) -> Self {
        Self::new(TrustAuditEventParams {
            kind,
            gun,
            roles: vec![role],
            version: Some(version),
            key_ids: Vec::new(),
            checksum: Some(checksum),
            attempt: None,
        })
    }

    /// Builds a version-conflict retry event.
    #[must_use]
    pub fn retry(gun: &Gun, attempt: u32) -> Self {
        Self::new(TrustAuditEventParams {
            kind: TrustAuditKind::VersionConflictRetry,
            gun,
            roles: Vec::new(),
            version: None,
            key_ids: Vec::new(),
            checksum: None,
            attempt: Some(attempt),
        })
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for trust events.
pub trait TrustAuditSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &TrustAuditEvent);
}

/// Audit sink that drops every event.
pub struct NoopAuditSink;

impl TrustAuditSink for NoopAuditSink {
    fn record(&self, _event: &TrustAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl TrustAuditSink for StderrAuditSink {
    fn record(&self, event: &TrustAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// Append-mode file handle.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens (or creates) `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] when the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TrustAuditSink for FileAuditSink {
    fn record(&self, event: &TrustAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}
