// crates/signet-config/src/config.rs
// ============================================================================
// Module: Signet Configuration
// Description: Configuration loading and validation for Signet.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: signet-core, signet-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is valid. Missing or invalid
//! configuration fails closed. A validated config builds the
//! [`RuntimeSettings`], metadata store, and audit sink used by
//! [`TrustServices`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use signet_core::ExpiryPolicy;
use signet_core::InMemoryMetaStore;
use signet_core::KeyAlgorithm;
use signet_core::RuntimeSettings;
use signet_core::SharedCryptoService;
use signet_core::SharedMetaStore;
use signet_core::TrustServices;
use signet_core::core::time::DEFAULT_ROOT_EXPIRY;
use signet_core::core::time::DEFAULT_SNAPSHOT_EXPIRY;
use signet_core::core::time::DEFAULT_TARGETS_EXPIRY;
use signet_core::core::time::DEFAULT_TIMESTAMP_EXPIRY;
use signet_core::runtime::DEFAULT_MAX_RETRIES;
use signet_core::runtime::DEFAULT_SIGNING_TIMEOUT;
use signet_core::runtime::FileAuditSink;
use signet_core::runtime::NoopAuditSink;
use signet_core::runtime::StderrAuditSink;
use signet_core::runtime::TrustAuditSink;
use signet_store_sqlite::SqliteMetaStore;
use signet_store_sqlite::SqliteStoreConfig;
use signet_store_sqlite::SqliteStoreMode;
use signet_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "signet.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "SIGNET_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Minimum signing timeout in milliseconds.
pub(crate) const MIN_SIGNING_TIMEOUT_MS: u64 = 10;
/// Maximum signing timeout in milliseconds.
pub(crate) const MAX_SIGNING_TIMEOUT_MS: u64 = 600_000;
/// Minimum optimistic retry budget.
pub(crate) const MIN_MAX_RETRIES: u32 = 1;
/// Maximum optimistic retry budget.
pub(crate) const MAX_MAX_RETRIES: u32 = 32;

// ============================================================================
// SECTION: Config Root
// ============================================================================

/// Signet configuration root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignetConfig {
    /// Per-role document lifetimes.
    #[serde(default)]
    pub expiry: ExpiryConfig,
    /// Signing behavior.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Publish retry behavior.
    #[serde(default)]
    pub publish: PublishConfig,
    /// Metadata store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit sink selection.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl SignetConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// the explicit path, then `SIGNET_CONFIG`, then `signet.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.expiry.validate()?;
        self.signing.validate()?;
        self.publish.validate()?;
        self.store.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the runtime settings described by this configuration.
    #[must_use]
    pub const fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            expiry: self.expiry.policy(),
            signing_timeout: Duration::from_millis(self.signing.timeout_ms),
            max_retries: self.publish.max_retries,
            default_algorithm: self.signing.default_algorithm,
        }
    }

    /// Builds runtime services over `crypto` with the configured store,
    /// audit sink, and settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Backend`] when the store or audit sink cannot
    /// be opened.
    pub fn build_services(&self, crypto: SharedCryptoService) -> Result<TrustServices, ConfigError> {
        let store = self.store.build()?;
        let audit = self.audit.build()?;
        Ok(TrustServices::new(store, crypto).with_audit(audit).with_settings(self.runtime_settings()))
    }
}

// ============================================================================
// SECTION: Expiry
// ============================================================================

/// Per-role document lifetimes in seconds.
///
/// # Invariants
/// - Every lifetime is greater than zero.
/// - `timestamp_secs` does not exceed `snapshot_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExpiryConfig {
    /// Root lifetime.
    #[serde(default = "default_root_secs")]
    pub root_secs: u64,
    /// Targets and delegated role lifetime.
    #[serde(default = "default_targets_secs")]
    pub targets_secs: u64,
    /// Snapshot lifetime.
    #[serde(default = "default_snapshot_secs")]
    pub snapshot_secs: u64,
    /// Timestamp lifetime.
    #[serde(default = "default_timestamp_secs")]
    pub timestamp_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            root_secs: default_root_secs(),
            targets_secs: default_targets_secs(),
            snapshot_secs: default_snapshot_secs(),
            timestamp_secs: default_timestamp_secs(),
        }
    }
}

impl ExpiryConfig {
    /// Validates lifetimes.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("expiry.root_secs", self.root_secs),
            ("expiry.targets_secs", self.targets_secs),
            ("expiry.snapshot_secs", self.snapshot_secs),
            ("expiry.timestamp_secs", self.timestamp_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
            }
        }
        if self.timestamp_secs > self.snapshot_secs {
            return Err(ConfigError::Invalid(
                "expiry.timestamp_secs must not exceed expiry.snapshot_secs".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts lifetimes into an expiry policy.
    #[must_use]
    pub const fn policy(&self) -> ExpiryPolicy {
        ExpiryPolicy {
            root: Duration::from_secs(self.root_secs),
            targets: Duration::from_secs(self.targets_secs),
            snapshot: Duration::from_secs(self.snapshot_secs),
            timestamp: Duration::from_secs(self.timestamp_secs),
        }
    }
}

// ============================================================================
// SECTION: Signing and Publish
// ============================================================================

/// Signing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SigningConfig {
    /// Per-signature timeout in milliseconds.
    #[serde(default = "default_signing_timeout_ms")]
    pub timeout_ms: u64,
    /// Algorithm used when keys are created.
    #[serde(default = "default_algorithm")]
    pub default_algorithm: KeyAlgorithm,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_signing_timeout_ms(),
            default_algorithm: default_algorithm(),
        }
    }
}

impl SigningConfig {
    /// Validates signing configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SIGNING_TIMEOUT_MS ..= MAX_SIGNING_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "signing.timeout_ms must be between {MIN_SIGNING_TIMEOUT_MS} and \
                 {MAX_SIGNING_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Publish configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PublishConfig {
    /// Retries after a version conflict before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

impl PublishConfig {
    /// Validates publish configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MAX_RETRIES ..= MAX_MAX_RETRIES).contains(&self.max_retries) {
            return Err(ConfigError::Invalid(format!(
                "publish.max_retries must be between {MIN_MAX_RETRIES} and {MAX_MAX_RETRIES}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Metadata store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Optional max versions to retain per namespace and role.
    #[serde(default)]
    pub max_versions: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_versions: None,
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_path_value("store.path", path)?;
                if self.max_versions == Some(0) {
                    return Err(ConfigError::Invalid(
                        "store max_versions must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Backend`] when the `SQLite` store cannot be opened.
    pub fn build(&self) -> Result<SharedMetaStore, ConfigError> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => {
                let store = SqliteMetaStore::new(SqliteStoreConfig {
                    path: path.clone(),
                    busy_timeout_ms: self.busy_timeout_ms,
                    journal_mode: self.journal_mode,
                    sync_mode: self.sync_mode,
                    max_versions: self.max_versions,
                })
                .map_err(|err| ConfigError::Backend(err.to_string()))?;
                Ok(SharedMetaStore::from_store(store))
            }
            (StoreType::Sqlite, None) => {
                Err(ConfigError::Invalid("sqlite store requires path".to_string()))
            }
            (StoreType::Memory, _) => Ok(SharedMetaStore::from_store(InMemoryMetaStore::new())),
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// Drop audit events.
    #[default]
    None,
    /// Write JSON lines to stderr.
    Stderr,
    /// Append JSON lines to a file.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => validate_path_value("audit.path", path),
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::None | AuditSinkType::Stderr, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid for the file sink".to_string(),
            )),
            (AuditSinkType::None | AuditSinkType::Stderr, None) => Ok(()),
        }
    }

    /// Opens the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Backend`] when the audit file cannot be opened.
    pub fn build(&self) -> Result<Arc<dyn TrustAuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => {
                let sink = FileAuditSink::new(path).map_err(|err| ConfigError::Backend(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// A configured backend could not be opened.
    #[error("config backend error: {0}")]
    Backend(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured file path against length constraints.
fn validate_path_value(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default root lifetime in seconds.
const fn default_root_secs() -> u64 {
    DEFAULT_ROOT_EXPIRY.as_secs()
}

/// Default targets lifetime in seconds.
const fn default_targets_secs() -> u64 {
    DEFAULT_TARGETS_EXPIRY.as_secs()
}

/// Default snapshot lifetime in seconds.
const fn default_snapshot_secs() -> u64 {
    DEFAULT_SNAPSHOT_EXPIRY.as_secs()
}

/// Default timestamp lifetime in seconds.
const fn default_timestamp_secs() -> u64 {
    DEFAULT_TIMESTAMP_EXPIRY.as_secs()
}

/// Default signing timeout in milliseconds.
fn default_signing_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_SIGNING_TIMEOUT.as_millis()).unwrap_or(MAX_SIGNING_TIMEOUT_MS)
}

/// Default key algorithm.
const fn default_algorithm() -> KeyAlgorithm {
    KeyAlgorithm::Ed25519
}

/// Default optimistic retry budget.
const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Default `SQLite` busy timeout in milliseconds.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn defaults_validate_and_match_core_defaults() {
        let config = SignetConfig::default();
        assert!(config.validate().is_ok());
        let settings = config.runtime_settings();
        assert_eq!(settings.expiry, ExpiryPolicy::default());
        assert_eq!(settings.signing_timeout, DEFAULT_SIGNING_TIMEOUT);
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(settings.default_algorithm, KeyAlgorithm::Ed25519);
    }

    #[test]
    fn expiry_rejects_zero_lifetimes() {
        let config = ExpiryConfig {
            targets_secs: 0,
            ..ExpiryConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("expiry.targets_secs"));
    }

    #[test]
    fn expiry_rejects_timestamp_outliving_snapshot() {
        let config = ExpiryConfig {
            snapshot_secs: 60,
            timestamp_secs: 61,
            ..ExpiryConfig::default()
        };
        assert!(config.validate().is_err());
        let equal = ExpiryConfig {
            snapshot_secs: 60,
            timestamp_secs: 60,
            ..ExpiryConfig::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn signing_timeout_bounds_are_inclusive() {
        for (timeout_ms, ok) in [(9, false), (10, true), (600_000, true), (600_001, false)] {
            let config = SigningConfig {
                timeout_ms,
                ..SigningConfig::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "timeout_ms = {timeout_ms}");
        }
    }

    #[test]
    fn retry_bounds_are_inclusive() {
        for (max_retries, ok) in [(0, false), (1, true), (32, true), (33, false)] {
            let config = PublishConfig {
                max_retries,
            };
            assert_eq!(config.validate().is_ok(), ok, "max_retries = {max_retries}");
        }
    }

    #[test]
    fn store_paths_follow_backend_type() {
        let memory_with_path = StoreConfig {
            path: Some(PathBuf::from("meta.sqlite")),
            ..StoreConfig::default()
        };
        assert!(memory_with_path.validate().is_err());
        let sqlite_without_path = StoreConfig {
            store_type: StoreType::Sqlite,
            ..StoreConfig::default()
        };
        assert!(sqlite_without_path.validate().is_err());
        let zero_retention = StoreConfig {
            store_type: StoreType::Sqlite,
            path: Some(PathBuf::from("meta.sqlite")),
            max_versions: Some(0),
            ..StoreConfig::default()
        };
        assert!(zero_retention.validate().is_err());
    }

    #[test]
    fn audit_path_follows_sink_type() {
        let file_without_path = AuditConfig {
            sink: AuditSinkType::File,
            path: None,
        };
        assert!(file_without_path.validate().is_err());
        let stderr_with_path = AuditConfig {
            sink: AuditSinkType::Stderr,
            path: Some(PathBuf::from("audit.jsonl")),
        };
        assert!(stderr_with_path.validate().is_err());
        let file_with_path = AuditConfig {
            sink: AuditSinkType::File,
            path: Some(PathBuf::from("audit.jsonl")),
        };
        assert!(file_with_path.validate().is_ok());
    }

    #[test]
    fn validate_path_value_rejects_long_components() {
        let long = PathBuf::from("a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        assert!(validate_path_value("store.path", &long).is_err());
        assert!(validate_path_value("store.path", Path::new("")).is_err());
        assert!(validate_path_value("store.path", Path::new("data/meta.sqlite")).is_ok());
    }
}
