//! Run-level coordination: resolve the VM set, validate it, and back up
//! every VM with bounded concurrency.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::backend::{ComputeBackend, VmRef};
use crate::concurrency::{TaskFailure, bounded_fan_out};
use crate::report::{RunSummary, SkippedVm, VmReport};
use crate::selection::VmSelection;
use crate::settings::BackupSettings;
use crate::vm_backup::{VmBackupUnit, VmError};

/// Errors returned by [`BackupOrchestrator::run`].
#[derive(Debug, Error)]
pub enum OrchestratorError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when VM discovery fails; nothing was backed up.
    #[error("failed to discover VMs: {source}")]
    Discovery {
        /// Backend error.
        #[source]
        source: E,
    },
    /// Raised when the run is cancelled while VMs are still being resolved
    /// or validated; nothing was backed up.
    #[error("backup run cancelled before any VM was scheduled")]
    Cancelled,
    /// Raised when at least one VM backup failed. Carries the full summary.
    #[error("{} of {} VM backups failed", .summary.failed_vms(), .summary.total_vms())]
    Failed {
        /// Outcome of every scheduled VM.
        summary: Box<RunSummary<E>>,
    },
}

/// Coordinates a backup run against a compute backend.
pub struct BackupOrchestrator<B> {
    backend: Arc<B>,
    settings: Arc<BackupSettings>,
}

impl<B> BackupOrchestrator<B>
where
    B: ComputeBackend + 'static,
{
    /// Creates an orchestrator owning `backend`.
    #[must_use]
    pub fn new(backend: B, settings: BackupSettings) -> Self {
        Self {
            backend: Arc::new(backend),
            settings: Arc::new(settings),
        }
    }

    /// Settings applied to every VM.
    #[must_use]
    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    /// Backs up every VM in `selection`.
    ///
    /// All scheduled VMs are attempted even when some fail.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Discovery`] when discovery fails,
    /// [`OrchestratorError::Cancelled`] when `cancel` fires before backups
    /// start, and [`OrchestratorError::Failed`] when any VM backup failed.
    pub async fn run(
        &self,
        selection: &VmSelection,
        cancel: &CancellationToken,
    ) -> Result<RunSummary<B::Error>, OrchestratorError<B::Error>> {
        let mut summary = RunSummary::default();
        let candidates = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            resolved = self.resolve(selection, &mut summary.skipped) => resolved?,
        };
        let vms = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            valid = self.validate(candidates, &mut summary.skipped) => valid,
        };

        if vms.is_empty() {
            warn!("no VMs selected for backup");
            return Ok(summary);
        }
        info!(
            count = vms.len(),
            max_parallel_vms = self.settings.max_parallel_vms,
            max_parallel_volumes = self.settings.max_parallel_volumes,
            "starting backup run"
        );

        summary.vms = self.backup_all(vms, cancel).await;
        info!(
            total = summary.total_vms(),
            failed = summary.failed_vms(),
            "backup run finished"
        );
        if summary.succeeded() {
            Ok(summary)
        } else {
            Err(OrchestratorError::Failed {
                summary: Box::new(summary),
            })
        }
    }

    async fn resolve(
        &self,
        selection: &VmSelection,
        skipped: &mut Vec<SkippedVm>,
    ) -> Result<Vec<VmRef>, OrchestratorError<B::Error>> {
        let found = match selection {
            VmSelection::Discover(filter) => {
                let vms = self
                    .backend
                    .discover_vms(filter)
                    .await
                    .map_err(|source| OrchestratorError::Discovery { source })?;
                info!(count = vms.len(), "discovered VMs");
                vms
            }
            VmSelection::Named(names) => {
                let mut vms = Vec::with_capacity(names.len());
                for name in names {
                    match self.backend.find_vm(name).await {
                        Ok(Some(vm)) => vms.push(vm),
                        Ok(None) => skip(skipped, name, String::from("not found")),
                        Err(err) => skip(skipped, name, format!("lookup failed: {err}")),
                    }
                }
                vms
            }
        };

        let mut seen = HashSet::new();
        Ok(found
            .into_iter()
            .filter(|vm| seen.insert(vm.id.clone()))
            .collect())
    }

    async fn validate(&self, candidates: Vec<VmRef>, skipped: &mut Vec<SkippedVm>) -> Vec<VmRef> {
        let mut valid = Vec::with_capacity(candidates.len());
        for vm in candidates {
            match self.backend.describe_vm(&vm.id).await {
                Ok(Some(summary)) if summary.is_complete() => valid.push(vm),
                Ok(Some(_)) => skip(skipped, &vm.name, String::from("incomplete server record")),
                Ok(None) => skip(skipped, &vm.name, String::from("server no longer exists")),
                Err(err) => skip(skipped, &vm.name, format!("validation failed: {err}")),
            }
        }
        valid
    }

    async fn backup_all(
        &self,
        vms: Vec<VmRef>,
        cancel: &CancellationToken,
    ) -> Vec<VmReport<B::Error>> {
        let shared_unit = VmBackupUnit::new(Arc::clone(&self.backend), Arc::clone(&self.settings));
        let backup_dir = self.settings.backup_dir.clone();
        let run_token = cancel.clone();
        let slots = bounded_fan_out(vms.clone(), self.settings.max_parallel_vms, cancel, move |vm| {
            let unit = shared_unit.clone();
            let base_dir = backup_dir.clone();
            let token = run_token.clone();
            let span = info_span!("vm", vm = %vm.name, id = %vm.id);
            async move { unit.backup_vm(&vm, &base_dir, &token).await }.instrument(span)
        })
        .await;

        vms.into_iter()
            .zip(slots)
            .map(|(vm, slot)| slot.unwrap_or_else(|failure| failed_unit(vm, failure)))
            .collect()
    }
}

fn skip(skipped: &mut Vec<SkippedVm>, name: &str, reason: String) {
    warn!(vm = name, %reason, "skipping VM");
    skipped.push(SkippedVm {
        name: name.to_owned(),
        reason,
    });
}

fn failed_unit<E>(vm: VmRef, failure: TaskFailure) -> VmReport<E>
where
    E: std::error::Error + 'static,
{
    let result = match failure {
        TaskFailure::Cancelled => Err(VmError::Cancelled {
            vm: vm.name.clone(),
        }),
        other => Err(VmError::Panicked {
            vm: vm.name.clone(),
            message: other.to_string(),
        }),
    };
    VmReport {
        vm,
        directory: None,
        volumes: Vec::new(),
        result,
    }
}
