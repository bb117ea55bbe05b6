//! Shared fixtures for backup BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use ostack_backup::test_support::{FakeCloud, FakeCloudError};
use ostack_backup::{BackupSettings, OrchestratorError, RunSummary, WaitPolicy};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct BackupContext {
    pub cloud: FakeCloud,
    pub settings: BackupSettings,
    pub outcome: Option<BackupOutcome>,
    pub workspace: Arc<TempDir>,
}

/// Facts captured from a finished run.
#[derive(Clone, Debug, Default)]
pub struct BackupOutcome {
    pub succeeded: bool,
    pub rendered: String,
    pub directories: Vec<(String, Utf8PathBuf)>,
    pub failed_volumes: Vec<(String, String)>,
}

impl BackupOutcome {
    pub fn from_result(
        result: Result<RunSummary<FakeCloudError>, OrchestratorError<FakeCloudError>>,
    ) -> Result<Self, BackupTestError> {
        let (succeeded, summary) = match result {
            Ok(summary) => (true, summary),
            Err(OrchestratorError::Failed { summary }) => (false, *summary),
            Err(err @ (OrchestratorError::Discovery { .. } | OrchestratorError::Cancelled)) => {
                return Err(BackupTestError::Fixture(err.to_string()));
            }
        };
        let directories = summary
            .vms
            .iter()
            .filter_map(|report| {
                report
                    .directory
                    .clone()
                    .map(|dir| (report.vm.name.clone(), dir))
            })
            .collect();
        let failed_volumes = summary
            .vms
            .iter()
            .flat_map(|report| {
                report
                    .volumes
                    .iter()
                    .filter(|volume| volume.result.is_err())
                    .map(|volume| (report.vm.name.clone(), volume.volume_id.to_string()))
            })
            .collect();
        Ok(Self {
            succeeded,
            rendered: summary.render(),
            directories,
            failed_volumes,
        })
    }

    pub fn directory(&self, vm: &str) -> Option<&Utf8PathBuf> {
        self.directories
            .iter()
            .find(|(name, _)| name == vm)
            .map(|(_, dir)| dir)
    }
}

#[derive(Clone, Debug, Error)]
pub enum BackupTestError {
    #[error("invalid backup fixture: {0}")]
    Fixture(String),
}

pub type BackupContextResult = Result<BackupContext, BackupTestError>;

#[fixture]
pub fn backup_context_result() -> BackupContextResult {
    build_backup_context()
}

#[fixture]
pub fn backup_context(backup_context_result: BackupContextResult) -> BackupContext {
    backup_context_result
        .unwrap_or_else(|err| panic!("backup context fixture should initialise: {err}"))
}

fn build_backup_context() -> BackupContextResult {
    let tmp = TempDir::new().map_err(|err| BackupTestError::Fixture(err.to_string()))?;
    let backup_dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .map_err(|path| BackupTestError::Fixture(format!("non UTF-8 path {}", path.display())))?;
    Ok(BackupContext {
        cloud: FakeCloud::new(),
        settings: BackupSettings {
            backup_dir,
            wait: WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(1)),
            cleanup_grace: Duration::from_secs(1),
            ..BackupSettings::default()
        },
        outcome: None,
        workspace: Arc::new(tmp),
    })
}
