//! BDD step definitions for backup runs.

use ostack_backup::test_support::FakeStep;
use ostack_backup::{BackupOrchestrator, ResourceKind, VmFilter, VmSelection};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{BackupContext, BackupOutcome, BackupTestError};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] BackupTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn finished(backup_context: &BackupContext) -> Result<&BackupOutcome, StepError> {
    backup_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("the backup has not run")))
}

#[given("a VM \"{name}\" with volumes \"{volumes}\"")]
fn vm_with_volumes(backup_context: BackupContext, name: String, volumes: String) -> BackupContext {
    let id = format!("id-{name}");
    backup_context
        .cloud
        .add_vm(&name, &id, &split_list(&volumes));
    backup_context
}

#[given("the image for volume \"{volume}\" enters \"{status}\"")]
fn image_enters_status(backup_context: BackupContext, volume: String, status: String) -> BackupContext {
    backup_context
        .cloud
        .script_status(&volume, ResourceKind::Image, &["queued", status.as_str()]);
    backup_context
}

#[given("snapshot creation fails for volume \"{volume}\"")]
fn snapshot_creation_fails(backup_context: BackupContext, volume: String) -> BackupContext {
    backup_context.cloud.fail_at(&volume, FakeStep::Snapshot);
    backup_context
}

#[given("the image for volume \"{volume}\" is empty")]
fn image_is_empty(backup_context: BackupContext, volume: String) -> BackupContext {
    backup_context.cloud.set_image_payload(&volume, b"");
    backup_context
}

#[when("I run the backup")]
fn run_backup(backup_context: BackupContext) -> Result<BackupContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let orchestrator =
        BackupOrchestrator::new(backup_context.cloud.clone(), backup_context.settings.clone());
    let selection = VmSelection::Discover(VmFilter::default());
    let result =
        runtime.block_on(async move { orchestrator.run(&selection, &CancellationToken::new()).await });
    let outcome = BackupOutcome::from_result(result)?;
    Ok(BackupContext {
        outcome: Some(outcome),
        ..backup_context
    })
}

#[then("the backup run succeeds")]
fn run_succeeds(backup_context: &BackupContext) -> Result<(), StepError> {
    let outcome = finished(backup_context)?;
    if outcome.succeeded {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected success, got:\n{}",
            outcome.rendered
        )))
    }
}

#[then("the backup run fails")]
fn run_fails(backup_context: &BackupContext) -> Result<(), StepError> {
    let outcome = finished(backup_context)?;
    if outcome.succeeded {
        Err(StepError::Assertion(format!(
            "expected failure, got:\n{}",
            outcome.rendered
        )))
    } else {
        Ok(())
    }
}

#[then("the backup of \"{vm}\" contains \"{files}\"")]
fn backup_contains(backup_context: &BackupContext, vm: String, files: String) -> Result<(), StepError> {
    let dir = finished(backup_context)?
        .directory(&vm)
        .ok_or_else(|| StepError::Assertion(format!("no backup directory for {vm}")))?;
    for file in split_list(&files) {
        let path = dir.join(file);
        let populated = std::fs::metadata(&path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);
        if !populated {
            return Err(StepError::Assertion(format!("expected non-empty {path}")));
        }
    }
    Ok(())
}

#[then("the backup of \"{vm}\" lacks \"{files}\"")]
fn backup_lacks(backup_context: &BackupContext, vm: String, files: String) -> Result<(), StepError> {
    let dir = finished(backup_context)?
        .directory(&vm)
        .ok_or_else(|| StepError::Assertion(format!("no backup directory for {vm}")))?;
    for file in split_list(&files) {
        let path = dir.join(file);
        if path.exists() {
            return Err(StepError::Assertion(format!("unexpected file {path}")));
        }
    }
    Ok(())
}

#[then("volume \"{volume}\" of \"{vm}\" failed")]
fn volume_failed(backup_context: &BackupContext, volume: String, vm: String) -> Result<(), StepError> {
    let failed = &finished(backup_context)?.failed_volumes;
    if failed.iter().any(|(name, id)| *name == vm && *id == volume) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {volume} of {vm} to fail; failures: {failed:?}"
        )))
    }
}

#[then("the summary reports \"{line}\"")]
fn summary_reports(backup_context: &BackupContext, line: String) -> Result<(), StepError> {
    let rendered = &finished(backup_context)?.rendered;
    if rendered.lines().any(|candidate| candidate == line) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "summary lacks {line:?}:\n{rendered}"
        )))
    }
}

#[then("no temporary resources remain")]
fn no_resources_remain(backup_context: &BackupContext) -> Result<(), StepError> {
    let live = backup_context.cloud.live_resources();
    if live.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("leaked resources: {live:?}")))
    }
}
