// crates/signet-config/src/lib.rs
// ============================================================================
// Module: Signet Config Library
// Description: Canonical config model and validation for Signet.
// Purpose: Single source of truth for signet.toml semantics.
// Dependencies: signet-core, signet-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `signet-config` defines the configuration model for Signet runtimes. It
//! loads `signet.toml` with strict size and path limits, validates every
//! section, and builds the runtime settings, metadata store, and audit sink
//! the core consumes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
