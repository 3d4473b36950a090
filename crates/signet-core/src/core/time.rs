// crates/signet-core/src/core/time.rs
// ============================================================================
// Module: Signet Time Model
// Description: Expiry timestamps, injectable clocks, and per-role expiry policy.
// Purpose: Keep freshness decisions deterministic under test.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Expiry values are UTC instants serialized as RFC 3339 strings. A document
//! is fresh while `expires > now`; an expiry equal to `now` is already stale.
//! Runtime components never read the wall clock directly; they ask a
//! [`Clock`], so tests can pin or advance time with [`FixedClock`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::roles::RoleName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Seconds in one day.
const DAY_SECS: u64 = 24 * 60 * 60;
/// Seconds in one (non-leap) year.
const YEAR_SECS: u64 = 365 * DAY_SECS;

/// Default root document lifetime (10 years).
pub const DEFAULT_ROOT_EXPIRY: Duration = Duration::from_secs(10 * YEAR_SECS);
/// Default targets document lifetime (3 years).
pub const DEFAULT_TARGETS_EXPIRY: Duration = Duration::from_secs(3 * YEAR_SECS);
/// Default snapshot document lifetime (3 years).
pub const DEFAULT_SNAPSHOT_EXPIRY: Duration = Duration::from_secs(3 * YEAR_SECS);
/// Default timestamp document lifetime (14 days).
pub const DEFAULT_TIMESTAMP_EXPIRY: Duration = Duration::from_secs(14 * DAY_SECS);

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// UTC instant with second precision on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Latest representable instant, used when an expiry computation overflows.
    #[must_use]
    pub const fn max() -> Self {
        Self(PrimitiveDateTime::MAX.assume_utc())
    }

    /// Builds a timestamp from unix seconds.
    #[must_use]
    pub fn from_unix_seconds(seconds: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp(seconds).ok().map(Self)
    }

    /// Returns unix seconds for this instant.
    #[must_use]
    pub const fn unix_seconds(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Returns this instant advanced by `duration`, saturating at [`Timestamp::max`].
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        time::Duration::try_from(duration)
            .ok()
            .and_then(|delta| self.0.checked_add(delta))
            .map_or_else(Self::max, |value| Self(value.replace_nanosecond(0).unwrap_or(value)))
    }

    /// Returns this instant moved back by `duration`, if representable.
    #[must_use]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        let delta = time::Duration::try_from(duration).ok()?;
        self.0.checked_sub(delta).map(Self)
    }

    /// Returns true when a document expiring at `self` is stale at `now`.
    ///
    /// The bound is inclusive: an expiry equal to `now` counts as expired, so
    /// a document is valid only strictly before its expiry instant. Covered by
    /// `snapshot_expiring_exactly_now_counts_as_expired` in `tests/snapshot.rs`.
    #[must_use]
    pub fn is_expired_at(self, now: Self) -> bool {
        self <= now
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}", self.0.unix_timestamp()),
        }
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(OffsetDateTime::now_utc())
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct FixedClock {
    /// Current instant.
    now: Mutex<Timestamp>,
}

impl FixedClock {
    /// Creates a clock pinned at `now`.
    #[must_use]
    pub const fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = guard.saturating_add(duration);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Expiry Policy
// ============================================================================

/// Lifetimes applied when a role document is (re)signed.
///
/// # Invariants
/// - Delegated roles use the targets lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Root document lifetime.
    pub root: Duration,
    /// Targets and delegated document lifetime.
    pub targets: Duration,
    /// Snapshot document lifetime.
    pub snapshot: Duration,
    /// Timestamp document lifetime.
    pub timestamp: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT_EXPIRY,
            targets: DEFAULT_TARGETS_EXPIRY,
            snapshot: DEFAULT_SNAPSHOT_EXPIRY,
            timestamp: DEFAULT_TIMESTAMP_EXPIRY,
        }
    }
}

impl ExpiryPolicy {
    /// Returns the lifetime configured for `role`.
    #[must_use]
    pub const fn lifetime(&self, role: &RoleName) -> Duration {
        match role {
            RoleName::Root => self.root,
            RoleName::Targets | RoleName::Delegation(_) => self.targets,
            RoleName::Snapshot => self.snapshot,
            RoleName::Timestamp => self.timestamp,
        }
    }

    /// Returns the expiry for a document of `role` signed at `now`.
    #[must_use]
    pub fn expires_for(&self, role: &RoleName, now: Timestamp) -> Timestamp {
        now.saturating_add(self.lifetime(role))
    }
}
