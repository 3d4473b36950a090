// crates/signet-core/tests/delegations.rs
// ============================================================================
// Module: Delegation Edit Tests
// Description: Working-set delegation edits, target listing, and path scoping.
// Purpose: Validate the eight delegation operations and effective paths.
// Dependencies: signet-core
// ============================================================================
//! ## Overview
//! Builds an in-memory working set, applies delegation edits, and checks the
//! resulting documents, key sweeps, and target resolution.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use signet_core::CallContext;
use signet_core::CryptoService;
use signet_core::FileMeta;
use signet_core::Gun;
use signet_core::InMemoryCryptoService;
use signet_core::KeyAlgorithm;
use signet_core::PublicKey;
use signet_core::RepoError;
use signet_core::RoleError;
use signet_core::RoleName;
use signet_core::Timestamp;
use signet_core::TrustRepo;
use signet_core::verify_signed;

fn gun() -> Gun {
    Gun::new("example.com/app")
}

fn expiry() -> Timestamp {
    Timestamp::from_unix_seconds(1_900_000_000).unwrap()
}

fn role(name: &str) -> RoleName {
    RoleName::delegation(name).unwrap()
}

fn paths(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn key(crypto: &InMemoryCryptoService, role: &RoleName) -> PublicKey {
    crypto.create(role, &gun(), KeyAlgorithm::Ed25519).unwrap()
}

fn repo(crypto: &InMemoryCryptoService) -> TrustRepo<'_> {
    let mut role_keys = BTreeMap::new();
    for canonical in [RoleName::Root, RoleName::Targets, RoleName::Snapshot, RoleName::Timestamp] {
        role_keys.insert(canonical.clone(), vec![key(crypto, &canonical)]);
    }
    let mut repo = TrustRepo::new(gun(), crypto);
    repo.init_root(&role_keys, expiry());
    repo.init_targets(RoleName::Targets, expiry()).unwrap();
    repo
}

fn delegated(repo: &TrustRepo<'_>, parent: &RoleName, name: &RoleName) -> signet_core::Role {
    repo.targets(parent).unwrap().signed.delegations.role(name).unwrap().clone()
}

// ============================================================================
// SECTION: Creating Delegations
// ============================================================================

#[test]
fn adding_paths_creates_the_delegation() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");

    repo.add_delegation_paths(&release, &paths(&["targets/release/*"])).unwrap();

    let record = delegated(&repo, &RoleName::Targets, &release);
    assert_eq!(record.paths, paths(&["targets/release/*"]));
    assert!(record.key_ids.is_empty());
    assert_eq!(record.threshold, signet_core::runtime::DEFAULT_DELEGATION_THRESHOLD);
    assert!(repo.dirty_targets().contains(&RoleName::Targets));
}

#[test]
fn adding_keys_keeps_existing_paths() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let signer = key(&crypto, &release);

    repo.add_delegation_paths(&release, &paths(&["targets/release/*"])).unwrap();
    repo.add_delegation_role_and_keys(&release, std::slice::from_ref(&signer)).unwrap();

    let record = delegated(&repo, &RoleName::Targets, &release);
    assert_eq!(record.key_ids, vec![signer.id()]);
    assert_eq!(record.paths, paths(&["targets/release/*"]));
    let document = repo.targets(&RoleName::Targets).unwrap();
    assert_eq!(document.signed.delegations.keys.get(&signer.id()), Some(&signer));
}

#[test]
fn add_delegation_merges_keys_and_paths_in_order() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let first = key(&crypto, &release);
    let second = key(&crypto, &release);

    repo.add_delegation(&release, std::slice::from_ref(&first), &paths(&["targets/release/a"])).unwrap();
    repo.add_delegation(&release, &[second.clone(), first.clone()], &paths(&["targets/release/b", "targets/release/a"]))
        .unwrap();

    let record = delegated(&repo, &RoleName::Targets, &release);
    assert_eq!(record.key_ids, vec![first.id(), second.id()]);
    assert_eq!(record.paths, paths(&["targets/release/a", "targets/release/b"]));
}

#[test]
fn invalid_names_and_paths_are_rejected() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");

    let err = repo.add_delegation_paths(&release, &paths(&["targets/../root"])).unwrap_err();
    assert!(matches!(err, RepoError::Role(RoleError::InvalidPath { .. })));
    assert!(repo.targets(&RoleName::Targets).unwrap().signed.delegations.roles.is_empty());

    let err = repo.add_delegation_paths(&RoleName::Snapshot, &paths(&["targets/x"])).unwrap_err();
    assert!(matches!(err, RepoError::Role(RoleError::InvalidRole { .. })));
}

#[test]
fn nested_delegations_require_their_parent() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let stable = role("targets/release/stable");
    let err = repo.add_delegation_paths(&stable, &paths(&["targets/release/stable"])).unwrap_err();
    assert_eq!(err, RepoError::RoleNotFound("targets/release".to_string()));
}

// ============================================================================
// SECTION: Editing Delegations
// ============================================================================

#[test]
fn edits_on_missing_delegations_fail() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let ghost = role("targets/ghost");
    let expected = RepoError::RoleNotFound("targets/ghost".to_string());
    assert_eq!(repo.remove_delegation_paths(&ghost, &paths(&["targets/ghost"])).unwrap_err(), expected);
    assert_eq!(repo.remove_delegation_keys(&ghost, &[]).unwrap_err(), expected);
    assert_eq!(repo.remove_delegation_keys_and_paths(&ghost, &[], &[]).unwrap_err(), expected);
    assert_eq!(repo.clear_delegation_paths(&ghost).unwrap_err(), expected);
    assert_eq!(repo.remove_delegation_role(&ghost).unwrap_err(), expected);
}

#[test]
fn removing_keys_sweeps_only_orphaned_keys() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let alpha = role("targets/alpha");
    let beta = role("targets/beta");
    let shared = key(&crypto, &alpha);
    let only_alpha = key(&crypto, &alpha);

    repo.add_delegation(&alpha, &[shared.clone(), only_alpha.clone()], &paths(&["targets/alpha"])).unwrap();
    repo.add_delegation(&beta, std::slice::from_ref(&shared), &paths(&["targets/beta"])).unwrap();
    repo.remove_delegation_keys(&alpha, &[shared.id(), only_alpha.id()]).unwrap();

    let keys = &repo.targets(&RoleName::Targets).unwrap().signed.delegations.keys;
    assert!(keys.contains_key(&shared.id()));
    assert!(!keys.contains_key(&only_alpha.id()));
    assert!(delegated(&repo, &RoleName::Targets, &alpha).key_ids.is_empty());
}

#[test]
fn path_removal_and_clearing_keep_keys() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let signer = key(&crypto, &release);
    repo.add_delegation(&release, std::slice::from_ref(&signer), &paths(&["targets/release/a", "targets/release/b"]))
        .unwrap();

    repo.remove_delegation_paths(&release, &paths(&["targets/release/a", "targets/release/zzz"])).unwrap();
    assert_eq!(delegated(&repo, &RoleName::Targets, &release).paths, paths(&["targets/release/b"]));

    repo.clear_delegation_paths(&release).unwrap();
    let record = delegated(&repo, &RoleName::Targets, &release);
    assert!(record.paths.is_empty());
    assert_eq!(record.key_ids, vec![signer.id()]);
}

#[test]
fn removing_keys_and_paths_together_allows_unusable_roles() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let signer = key(&crypto, &release);
    repo.add_delegation(&release, std::slice::from_ref(&signer), &paths(&["targets/release/*"])).unwrap();

    repo.remove_delegation_keys_and_paths(&release, &[signer.id()], &paths(&["targets/release/*"])).unwrap();
    let record = delegated(&repo, &RoleName::Targets, &release);
    assert!(record.key_ids.is_empty());
    assert!(record.paths.is_empty());
    assert_eq!(record.threshold, 1);
    assert!(repo.targets(&RoleName::Targets).unwrap().signed.delegations.keys.is_empty());
}

#[test]
fn removing_a_delegation_does_not_cascade() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let stable = role("targets/release/stable");
    let signer = key(&crypto, &release);
    repo.add_delegation(&release, std::slice::from_ref(&signer), &paths(&["targets/release/*"])).unwrap();
    repo.add_delegation(&stable, std::slice::from_ref(&signer), &paths(&["targets/release/stable"])).unwrap();
    assert!(repo.targets(&release).is_some());

    repo.remove_delegation_role(&release).unwrap();

    let top = repo.targets(&RoleName::Targets).unwrap();
    assert!(top.signed.delegations.roles.is_empty());
    assert!(top.signed.delegations.keys.is_empty());
    assert!(repo.targets(&release).is_none());
    assert_eq!(repo.removed_roles(), vec![release.clone()]);
    assert!(matches!(repo.delegation_role(&stable), Err(RepoError::RoleNotFound(_))));
    assert!(repo.delegation_roles().unwrap().is_empty());
}

// ============================================================================
// SECTION: Targets and Paths
// ============================================================================

#[test]
fn delegated_targets_must_fall_inside_paths() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    repo.add_delegation_paths(&release, &paths(&["targets/release/*"])).unwrap();

    repo.add_target(&release, "release/v1.tar.gz", FileMeta::from_bytes(b"v1")).unwrap();
    let err = repo.add_target(&release, "release/nested/v1", FileMeta::from_bytes(b"v1")).unwrap_err();
    assert_eq!(
        err,
        RepoError::TargetOutsidePaths {
            role: "targets/release".to_string(),
            target: "release/nested/v1".to_string(),
        }
    );
    assert!(matches!(
        repo.add_target(&release, "/abs", FileMeta::from_bytes(b"x")),
        Err(RepoError::InvalidTarget { .. })
    ));
    assert!(matches!(repo.add_target(&RoleName::Targets, "", FileMeta::from_bytes(b"x")), Err(RepoError::InvalidTarget { .. })));
}

#[test]
fn nested_paths_are_narrowed_by_ancestors() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let stable = role("targets/release/stable");
    repo.add_delegation_paths(&release, &paths(&["targets/release/*"])).unwrap();
    repo.add_delegation_paths(&stable, &paths(&["targets/release/stable", "targets/other"])).unwrap();

    let effective = repo.delegation_role(&stable).unwrap();
    assert_eq!(effective.paths, paths(&["targets/release/stable"]));
    repo.add_target(&stable, "release/stable", FileMeta::from_bytes(b"s")).unwrap();
    assert!(matches!(
        repo.add_target(&stable, "other", FileMeta::from_bytes(b"o")),
        Err(RepoError::TargetOutsidePaths { .. })
    ));
}

#[test]
fn listing_follows_priority_order() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let alpha = role("targets/alpha");
    let beta = role("targets/beta");
    repo.add_delegation_paths(&alpha, &paths(&["targets/*"])).unwrap();
    repo.add_delegation_paths(&beta, &paths(&["targets/*"])).unwrap();
    repo.add_target(&RoleName::Targets, "top", FileMeta::from_bytes(b"top")).unwrap();
    repo.add_target(&beta, "shared", FileMeta::from_bytes(b"beta")).unwrap();
    repo.add_target(&alpha, "shared", FileMeta::from_bytes(b"alpha")).unwrap();
    repo.add_target(&beta, "top", FileMeta::from_bytes(b"shadowed")).unwrap();

    let listed = repo.list_targets(&[]).unwrap();
    let summary: Vec<(String, RoleName)> = listed.iter().map(|entry| (entry.name.clone(), entry.role.clone())).collect();
    assert_eq!(
        summary,
        vec![
            ("top".to_string(), RoleName::Targets),
            ("shared".to_string(), alpha.clone()),
        ]
    );

    let shared = repo.get_target_by_name("shared", &[]).unwrap().unwrap();
    assert_eq!(shared.meta, FileMeta::from_bytes(b"alpha"));
    let from_beta = repo.get_target_by_name("shared", std::slice::from_ref(&beta)).unwrap().unwrap();
    assert_eq!(from_beta.role, beta);
    assert!(repo.get_target_by_name("absent", &[]).unwrap().is_none());
    assert_eq!(
        repo.delegation_roles().unwrap().iter().map(|record| record.name.clone()).collect::<Vec<_>>(),
        vec![alpha, beta]
    );
}

#[test]
fn removing_targets_reports_presence() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    repo.add_target(&RoleName::Targets, "app", FileMeta::from_bytes(b"app")).unwrap();
    assert!(repo.remove_target(&RoleName::Targets, "app").unwrap());
    assert!(!repo.remove_target(&RoleName::Targets, "app").unwrap());
    assert!(matches!(
        repo.remove_target(&role("targets/none"), "app"),
        Err(RepoError::RoleNotFound(_))
    ));
}

#[test]
fn delegated_documents_are_signed_by_delegation_keys() {
    let crypto = InMemoryCryptoService::new();
    let mut repo = repo(&crypto);
    let release = role("targets/release");
    let signer = key(&crypto, &release);
    repo.add_delegation(&release, std::slice::from_ref(&signer), &paths(&["targets/release/*"])).unwrap();
    repo.add_target(&release, "release/v1", FileMeta::from_bytes(b"v1")).unwrap();

    let mut signed = repo.sign_targets(&release, expiry(), &CallContext::background()).unwrap();
    assert_eq!(signed.version(), 1);
    let effective = repo.delegation_role(&release).unwrap();
    assert_eq!(verify_signed(&mut signed, &effective.base).unwrap(), 1);
    assert!(!repo.dirty_targets().contains(&release));
}
