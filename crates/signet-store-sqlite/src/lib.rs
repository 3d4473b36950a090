// crates/signet-store-sqlite/src/lib.rs
// ============================================================================
// Module: Signet SQLite Store Library
// Description: Durable MetaStore implementation backed by SQLite.
// Purpose: Persist versioned trust metadata across process restarts.
// Dependencies: signet-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! `signet-store-sqlite` provides [`SqliteMetaStore`], a [`signet_core::MetaStore`]
//! that keeps every committed document version per namespace and role,
//! verifies stored hashes on read, and records the timestamp change feed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::*;
