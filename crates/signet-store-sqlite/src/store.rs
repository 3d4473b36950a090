// crates/signet-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Metadata Store
// Description: Durable MetaStore backed by SQLite WAL.
// Purpose: Persist signed metadata versions with hash-verified reads.
// Dependencies: signet-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`MetaStore`] using `SQLite`. Every commit
//! appends one row per document to a version table and moves the per-role
//! head pointer inside a single immediate transaction, so concurrent writers
//! observe the same gap-free version rules as the in-memory store. Reads
//! verify the stored hash before returning bytes and fail closed on
//! corruption. Committed timestamps are mirrored into a change feed table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use signet_core::Change;
use signet_core::Gun;
use signet_core::MetaStore;
use signet_core::MetaUpdate;
use signet_core::RoleName;
use signet_core::StoreError;
use signet_core::check_batch;
use signet_core::check_next_version;
use signet_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use signet_core::core::hashing::HashAlgorithm;
use signet_core::core::hashing::hash_bytes;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum size of a single stored document in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` metadata store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `max_versions`, when set, must be greater than zero. The current
///   version of a role is never pruned.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Optional maximum versions kept per namespace and role.
    #[serde(default)]
    pub max_versions: Option<u64>,
}

impl SqliteStoreConfig {
    /// Returns a configuration for `path` with default settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_versions: None,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding document payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Document exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Store(format!("schema version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "document exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error into a store error.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed metadata store with WAL support.
///
/// # Invariants
/// - Reads verify stored hashes before returning bytes.
/// - `SQLite` connection access is serialized through a mutex.
/// - Writes run in immediate transactions; a rejected batch commits nothing.
#[derive(Clone)]
pub struct SqliteMetaStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
}

/// One validated update ready for insertion.
struct PreparedUpdate {
    /// Role being written.
    role: RoleName,
    /// Version being written.
    attempted: u64,
    /// `attempted` as a database integer.
    version: i64,
    /// Document bytes.
    data: Vec<u8>,
    /// Hash of `data`.
    hash: String,
}

impl SqliteMetaStore {
    /// Opens an `SQLite`-backed metadata store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is unsafe or the database
    /// cannot be opened or initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        if config.max_versions == Some(0) {
            return Err(SqliteStoreError::Invalid(
                "max_versions must be greater than zero".to_string(),
            ));
        }
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Loads and verifies one document.
    fn load(
        &self,
        gun: &Gun,
        role: &RoleName,
        selector: DocumentSelector<'_>,
    ) -> Result<Option<Vec<u8>>, SqliteStoreError> {
        let guard = self.lock()?;
        let payload = fetch_document(&guard, gun, role, selector)?;
        drop(guard);
        payload.map(|payload| payload.verify(gun, role)).transpose()
    }

    /// Validates and converts a batch before any row is touched.
    fn prepare(updates: Vec<MetaUpdate>) -> Result<Vec<PreparedUpdate>, StoreError> {
        check_batch(&updates)?;
        updates
            .into_iter()
            .map(|update| -> Result<PreparedUpdate, StoreError> {
                if update.data.len() > MAX_DOCUMENT_BYTES {
                    return Err(SqliteStoreError::TooLarge {
                        max_bytes: MAX_DOCUMENT_BYTES,
                        actual_bytes: update.data.len(),
                    }
                    .into());
                }
                let version = i64::try_from(update.version).map_err(|_| {
                    StoreError::Invalid(format!("version {} out of range", update.version))
                })?;
                let hash = hash_bytes(DEFAULT_HASH_ALGORITHM, &update.data);
                Ok(PreparedUpdate {
                    role: update.role,
                    attempted: update.version,
                    version,
                    data: update.data,
                    hash,
                })
            })
            .collect()
    }
}

impl MetaStore for SqliteMetaStore {
    fn get_current(&self, gun: &Gun, role: &RoleName) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.load(gun, role, DocumentSelector::Current)?)
    }

    fn update_current(&self, gun: &Gun, update: MetaUpdate) -> Result<(), StoreError> {
        self.update_many(gun, vec![update])
    }

    fn update_many(&self, gun: &Gun, updates: Vec<MetaUpdate>) -> Result<(), StoreError> {
        let prepared = Self::prepare(updates)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        for update in &prepared {
            let current = latest_version(&tx, gun, &update.role)?;
            check_next_version(gun, &update.role, current, update.attempted)?;
        }
        let recorded_at = unix_millis();
        for update in &prepared {
            apply_update_in_tx(&tx, gun, update, recorded_at, self.config.max_versions)?;
        }
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    fn get_checksum(
        &self,
        gun: &Gun,
        role: &RoleName,
        checksum: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.load(gun, role, DocumentSelector::Checksum(checksum))?)
    }

    fn get_version(
        &self,
        gun: &Gun,
        role: &RoleName,
        version: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let Ok(version) = i64::try_from(version) else {
            return Ok(None);
        };
        Ok(self.load(gun, role, DocumentSelector::Version(version))?)
    }

    fn delete(&self, gun: &Gun) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute("DELETE FROM role_heads WHERE gun = ?1", params![gun.as_str()])
            .map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    fn changes(
        &self,
        after: u64,
        limit: usize,
        gun_filter: Option<&Gun>,
    ) -> Result<Vec<Change>, StoreError> {
        let after = i64::try_from(after).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let guard = self.lock()?;
        let rows = fetch_changes(&guard, after, limit, gun_filter.map(Gun::as_str))?;
        drop(guard);
        rows.into_iter()
            .map(|row| row.into_change().map_err(StoreError::from))
            .collect()
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map_err(db_error)?;
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Returns the head version for `(gun, role)`, or 0 when none is stored.
fn latest_version(
    tx: &rusqlite::Transaction<'_>,
    gun: &Gun,
    role: &RoleName,
) -> Result<u64, SqliteStoreError> {
    let latest: Option<i64> = {
        let mut stmt = tx
            .prepare_cached("SELECT latest_version FROM role_heads WHERE gun = ?1 AND role = ?2")
            .map_err(db_error)?;
        stmt.query_row(params![gun.as_str(), role.to_string()], |row| row.get(0))
            .optional()
            .map_err(db_error)?
    };
    match latest {
        None => Ok(0),
        Some(value) => u64::try_from(value)
            .ok()
            .filter(|value| *value >= 1)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid latest_version for {gun}/{role}"))),
    }
}

/// Appends one prepared update inside an existing transaction.
fn apply_update_in_tx(
    tx: &rusqlite::Transaction<'_>,
    gun: &Gun,
    update: &PreparedUpdate,
    recorded_at: i64,
    max_versions: Option<u64>,
) -> Result<(), SqliteStoreError> {
    let role = update.role.to_string();
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO role_heads (gun, role, latest_version) VALUES (?1, ?2, ?3) ON \
                 CONFLICT(gun, role) DO UPDATE SET latest_version = excluded.latest_version",
            )
            .map_err(db_error)?;
        stmt.execute(params![gun.as_str(), role, update.version]).map_err(db_error)?;
    }
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO metadata_versions (gun, role, version, data, data_hash, \
                 hash_algorithm, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(db_error)?;
        stmt.execute(params![
            gun.as_str(),
            role,
            update.version,
            update.data.as_slice(),
            update.hash.as_str(),
            DEFAULT_HASH_ALGORITHM.as_str(),
            recorded_at
        ])
        .map_err(db_error)?;
    }
    if update.role == RoleName::Timestamp {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO changes (gun, version, checksum, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(db_error)?;
        stmt.execute(params![gun.as_str(), update.version, update.hash.as_str(), recorded_at])
            .map_err(db_error)?;
    }
    enforce_retention(tx, gun, &role, update.version, max_versions)
}

/// Prunes versions older than the retention window, keeping the head.
fn enforce_retention(
    tx: &rusqlite::Transaction<'_>,
    gun: &Gun,
    role: &str,
    latest_version: i64,
    max_versions: Option<u64>,
) -> Result<(), SqliteStoreError> {
    let Some(max_versions) = max_versions else {
        return Ok(());
    };
    let max_versions = i64::try_from(max_versions)
        .map_err(|_| SqliteStoreError::Invalid("max_versions too large".to_string()))?;
    if latest_version > max_versions {
        let min_version = latest_version - max_versions + 1;
        tx.execute(
            "DELETE FROM metadata_versions WHERE gun = ?1 AND role = ?2 AND version < ?3",
            params![gun.as_str(), role, min_version],
        )
        .map_err(db_error)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Which stored version of a role to load.
#[derive(Debug, Clone, Copy)]
enum DocumentSelector<'a> {
    /// The head version.
    Current,
    /// A specific version.
    Version(i64),
    /// The oldest version with this hash.
    Checksum(&'a str),
}

/// Raw stored document row.
#[derive(Debug)]
struct DocumentPayload {
    /// Stored version.
    version: i64,
    /// Stored bytes.
    bytes: Vec<u8>,
    /// Stored hash value.
    hash_value: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

impl DocumentPayload {
    /// Checks size and hash, returning the verified bytes.
    fn verify(self, gun: &Gun, role: &RoleName) -> Result<Vec<u8>, SqliteStoreError> {
        if self.bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_DOCUMENT_BYTES,
                actual_bytes: self.bytes.len(),
            });
        }
        let algorithm = parse_hash_algorithm(&self.hash_algorithm)?;
        if hash_bytes(algorithm, &self.bytes) != self.hash_value {
            return Err(SqliteStoreError::Corrupt(format!(
                "hash mismatch for {gun}/{role} version {}",
                self.version
            )));
        }
        Ok(self.bytes)
    }
}

/// Maps a document row.
fn map_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentPayload> {
    Ok(DocumentPayload {
        version: row.get(0)?,
        bytes: row.get(1)?,
        hash_value: row.get(2)?,
        hash_algorithm: row.get(3)?,
    })
}

/// Fetches one stored document row.
fn fetch_document(
    connection: &Connection,
    gun: &Gun,
    role: &RoleName,
    selector: DocumentSelector<'_>,
) -> Result<Option<DocumentPayload>, SqliteStoreError> {
    let role = role.to_string();
    let row = match selector {
        DocumentSelector::Current => connection
            .query_row(
                "SELECT v.version, v.data, v.data_hash, v.hash_algorithm FROM metadata_versions v \
                 JOIN role_heads h ON v.gun = h.gun AND v.role = h.role AND v.version = \
                 h.latest_version WHERE h.gun = ?1 AND h.role = ?2",
                params![gun.as_str(), role],
                map_document_row,
            )
            .optional(),
        DocumentSelector::Version(version) => connection
            .query_row(
                "SELECT version, data, data_hash, hash_algorithm FROM metadata_versions WHERE gun \
                 = ?1 AND role = ?2 AND version = ?3",
                params![gun.as_str(), role, version],
                map_document_row,
            )
            .optional(),
        DocumentSelector::Checksum(checksum) => connection
            .query_row(
                "SELECT version, data, data_hash, hash_algorithm FROM metadata_versions WHERE gun \
                 = ?1 AND role = ?2 AND data_hash = ?3 ORDER BY version ASC LIMIT 1",
                params![gun.as_str(), role, checksum],
                map_document_row,
            )
            .optional(),
    };
    row.map_err(db_error)
}

/// Raw change feed row.
#[derive(Debug)]
struct ChangeRow {
    /// Change identifier.
    id: i64,
    /// Namespace.
    gun: String,
    /// Timestamp version.
    version: i64,
    /// Timestamp hash.
    checksum: String,
    /// Commit time in unix milliseconds.
    recorded_at: i64,
}

impl ChangeRow {
    /// Converts the row into a feed entry.
    fn into_change(self) -> Result<Change, SqliteStoreError> {
        let id = u64::try_from(self.id)
            .map_err(|_| SqliteStoreError::Corrupt(format!("invalid change id {}", self.id)))?;
        let version = u64::try_from(self.version).map_err(|_| {
            SqliteStoreError::Corrupt(format!("invalid version in change {}", self.id))
        })?;
        Ok(Change {
            id,
            gun: Gun::new(self.gun),
            version,
            checksum: self.checksum,
            recorded_at_ms: self.recorded_at,
        })
    }
}

/// Fetches a page of the change feed.
fn fetch_changes(
    connection: &Connection,
    after: i64,
    limit: i64,
    gun_filter: Option<&str>,
) -> Result<Vec<ChangeRow>, SqliteStoreError> {
    let mut stmt = connection
        .prepare_cached(
            "SELECT id, gun, version, checksum, recorded_at FROM changes WHERE id > ?1 AND (?2 IS \
             NULL OR gun = ?2) ORDER BY id ASC LIMIT ?3",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![after, gun_filter, limit], |row| {
            Ok(ChangeRow {
                id: row.get(0)?,
                gun: row.get(1)?,
                version: row.get(2)?,
                checksum: row.get(3)?,
                recorded_at: row.get(4)?,
            })
        })
        .map_err(db_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS role_heads (
                    gun TEXT NOT NULL,
                    role TEXT NOT NULL,
                    latest_version INTEGER NOT NULL,
                    PRIMARY KEY (gun, role)
                );
                CREATE TABLE IF NOT EXISTS metadata_versions (
                    gun TEXT NOT NULL,
                    role TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    data BLOB NOT NULL,
                    data_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (gun, role, version),
                    FOREIGN KEY (gun, role)
                        REFERENCES role_heads(gun, role) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_metadata_versions_hash
                    ON metadata_versions (gun, role, data_hash);
                CREATE TABLE IF NOT EXISTS changes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    gun TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    checksum TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_changes_gun ON changes (gun, id);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    HashAlgorithm::from_label(label)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("unsupported hash algorithm: {label}")))
}
