//! BDD scenarios for backup runs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BackupContextResult, backup_context_result};

#[scenario(
    path = "tests/features/backup.feature",
    name = "Back up a VM with two volumes"
)]
fn scenario_two_volumes(backup_context_result: BackupContextResult) {
    drop(backup_context_result);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "An image in error state fails only its volume"
)]
fn scenario_image_error(backup_context_result: BackupContextResult) {
    drop(backup_context_result);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "A failing VM does not stop its siblings"
)]
fn scenario_sibling_isolation(backup_context_result: BackupContextResult) {
    drop(backup_context_result);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "An empty image leaves no file behind"
)]
fn scenario_empty_image(backup_context_result: BackupContextResult) {
    drop(backup_context_result);
}
