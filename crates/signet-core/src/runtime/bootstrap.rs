// crates/signet-core/src/runtime/bootstrap.rs
// ============================================================================
// Module: Signet Repository Bootstrap
// Description: Builds the first signed document set of a namespace.
// Purpose: Share initial-repository construction between publish and rotation.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! A new namespace gets root, targets, snapshot, and timestamp documents at
//! version 1. Root keys are supplied by the caller; one fresh key is created
//! for each other canonical role. Key creation and signing are separate steps
//! so a retried commit re-signs with the keys of the first attempt. Nothing is
//! written here: the caller commits the returned updates in one batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::CallContext;
use crate::core::Gun;
use crate::core::MetaUpdate;
use crate::core::MetadataError;
use crate::core::PublicKey;
use crate::core::RoleName;
use crate::interfaces::CryptoError;
use crate::interfaces::CryptoService;
use crate::runtime::repo::RepoError;
use crate::runtime::services::TrustServices;

// ============================================================================
// SECTION: Initial Repository
// ============================================================================

/// Creates one fresh key each for targets, snapshot, and timestamp, and
/// pairs them with `root_keys` as the canonical role key sets.
///
/// Callers that retry must resolve this once and reuse the result: every
/// call creates new keys in the crypto service.
///
/// # Errors
///
/// Returns the crypto error when key creation fails or `ctx` is done.
pub(crate) fn initial_role_keys<E>(
    services: &TrustServices,
    gun: &Gun,
    root_keys: &[PublicKey],
    ctx: &CallContext,
) -> Result<BTreeMap<RoleName, Vec<PublicKey>>, E>
where
    E: From<CryptoError>,
{
    let algorithm = services.settings.default_algorithm;
    let mut role_keys: BTreeMap<RoleName, Vec<PublicKey>> = BTreeMap::new();
    role_keys.insert(RoleName::Root, root_keys.to_vec());
    for role in [RoleName::Targets, RoleName::Snapshot, RoleName::Timestamp] {
        ctx.check().map_err(CryptoError::from)?;
        let key = services.crypto.create(&role, gun, algorithm)?;
        role_keys.insert(role, vec![key]);
    }
    Ok(role_keys)
}

/// Signs version 1 of every canonical document with `role_keys`.
///
/// No keys are created here, so an attempt may be repeated freely.
pub(crate) fn initial_documents<E>(
    services: &TrustServices,
    gun: &Gun,
    role_keys: &BTreeMap<RoleName, Vec<PublicKey>>,
    ctx: &CallContext,
) -> Result<Vec<MetaUpdate>, E>
where
    E: From<RepoError> + From<MetadataError>,
{
    let mut repo = services.repo(gun);
    repo.init_root(role_keys, services.expires_for(&RoleName::Root));
    let root = repo.sign_root(services.expires_for(&RoleName::Root), ctx)?;
    repo.init_targets(RoleName::Targets, services.expires_for(&RoleName::Targets))?;
    let targets = repo.sign_targets(&RoleName::Targets, services.expires_for(&RoleName::Targets), ctx)?;
    let snapshot = repo.sign_snapshot(services.expires_for(&RoleName::Snapshot), ctx)?;
    let snapshot_update = MetaUpdate::from_signed(RoleName::Snapshot, &snapshot)?;
    let timestamp =
        repo.sign_timestamp(&snapshot_update.data, services.expires_for(&RoleName::Timestamp), ctx)?;

    Ok(vec![
        MetaUpdate::from_signed(RoleName::Root, &root)?,
        MetaUpdate::from_signed(RoleName::Targets, &targets)?,
        snapshot_update,
        MetaUpdate::from_signed(RoleName::Timestamp, &timestamp)?,
    ])
}
