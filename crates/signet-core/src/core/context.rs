// crates/signet-core/src/core/context.rs
// ============================================================================
// Module: Signet Call Context
// Description: Cancellation flag and deadline carried through runtime calls.
// Purpose: Let callers abandon slow signing or storage work before commit.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A [`CallContext`] is cloned into every collaborator call. Clones share the
//! cancellation flag; [`CallContext::with_timeout`] derives a child whose
//! deadline is the earlier of the parent deadline and the new bound.
//! Runtime operations check the context before each collaborator call and
//! perform the metadata write last, so abandoning an operation never leaves a
//! partial commit behind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons an operation stopped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Cancellation token plus optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
    /// Optional absolute deadline.
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context with no deadline that is never cancelled unless asked.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a child context bounded by an absolute deadline.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Returns a child context that expires after `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Cancels this context and every context sharing its flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CallContext::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails when the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] describing why the operation must stop.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }
}
