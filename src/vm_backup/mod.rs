//! Backup of one VM: its documents, then every attached volume.

use std::sync::Arc;

use camino::Utf8Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::artifacts::{self, ArtifactError};
use crate::backend::{ComputeBackend, VmRef};
use crate::concurrency::{TaskFailure, bounded_fan_out};
use crate::pipeline::{PipelineError, Step, VolumePipeline};
use crate::report::{VmReport, VolumeReport};
use crate::resource::VolumeId;
use crate::settings::BackupSettings;

/// Errors that fail the backup of one VM.
#[derive(Debug, Error)]
pub enum VmError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the run directory cannot be created.
    #[error("failed to prepare backup directory for {vm}: {source}")]
    Directory {
        /// VM name.
        vm: String,
        /// Underlying error.
        #[source]
        source: ArtifactError,
    },
    /// Raised when the attached volumes cannot be listed.
    #[error("failed to list volumes of {vm}: {source}")]
    ListVolumes {
        /// VM name.
        vm: String,
        /// Backend error.
        #[source]
        source: E,
    },
    /// Raised when at least one volume export failed.
    #[error("{failed} of {total} volume backups failed for {vm}")]
    Volumes {
        /// VM name.
        vm: String,
        /// Number of failed volumes.
        failed: usize,
        /// Number of attached volumes.
        total: usize,
    },
    /// Raised when the run was cancelled before the volumes were exported.
    #[error("backup of {vm} cancelled")]
    Cancelled {
        /// VM name.
        vm: String,
    },
    /// Raised when the unit itself panicked.
    #[error("backup of {vm} panicked: {message}")]
    Panicked {
        /// VM name.
        vm: String,
        /// Panic message.
        message: String,
    },
}

/// Backs up single VMs against a compute backend.
pub struct VmBackupUnit<B> {
    backend: Arc<B>,
    settings: Arc<BackupSettings>,
    pipeline: VolumePipeline<B>,
}

impl<B> Clone for VmBackupUnit<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            settings: Arc::clone(&self.settings),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<B> VmBackupUnit<B>
where
    B: ComputeBackend + 'static,
{
    /// Creates a unit sharing `backend` and `settings`.
    #[must_use]
    pub fn new(backend: Arc<B>, settings: Arc<BackupSettings>) -> Self {
        let pipeline = VolumePipeline::new(Arc::clone(&backend), Arc::clone(&settings));
        Self {
            backend,
            settings,
            pipeline,
        }
    }

    /// Backs up `vm` into a fresh run directory under `base_dir`.
    ///
    /// Document failures are logged and ignored. Volume exports run
    /// concurrently up to the per-VM limit and are all awaited; a failing
    /// volume does not stop its siblings.
    pub async fn backup_vm(
        &self,
        vm: &VmRef,
        base_dir: &Utf8Path,
        cancel: &CancellationToken,
    ) -> VmReport<B::Error> {
        let mut report = VmReport {
            vm: vm.clone(),
            directory: None,
            volumes: Vec::new(),
            result: Ok(()),
        };
        if cancel.is_cancelled() {
            report.result = Err(VmError::Cancelled {
                vm: vm.name.clone(),
            });
            return report;
        }

        let dir = match artifacts::create_run_directory(base_dir, &vm.name).await {
            Ok(dir) => dir,
            Err(source) => {
                report.result = Err(VmError::Directory {
                    vm: vm.name.clone(),
                    source,
                });
                return report;
            }
        };
        info!(vm = %vm.name, path = %dir, "backing up VM");
        report.directory = Some(dir.clone());

        self.save_documents(vm, &dir, cancel).await;

        let listed = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                report.result = Err(VmError::Cancelled { vm: vm.name.clone() });
                return report;
            }
            listed = self.backend.attached_volumes(vm) => listed,
        };
        let volumes = match listed {
            Ok(volumes) => volumes,
            Err(source) => {
                report.result = Err(VmError::ListVolumes {
                    vm: vm.name.clone(),
                    source,
                });
                return report;
            }
        };
        if volumes.is_empty() {
            info!(vm = %vm.name, "no attached volumes");
            return report;
        }
        info!(vm = %vm.name, count = volumes.len(), "backing up attached volumes");

        report.volumes = self.export_volumes(vm, volumes, &dir, cancel).await;
        let failed = report.failed_volumes();
        if failed > 0 {
            report.result = Err(VmError::Volumes {
                vm: vm.name.clone(),
                failed,
                total: report.volumes.len(),
            });
        }
        report
    }

    async fn save_documents(&self, vm: &VmRef, dir: &Utf8Path, cancel: &CancellationToken) {
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            fetched = self.backend.vm_documents(vm) => fetched,
        };
        let outcome = match fetched {
            Ok(documents) => artifacts::write_documents(dir, &documents)
                .await
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(error) = outcome {
            warn!(vm = %vm.name, %error, "failed to save VM configuration; continuing with volumes");
        }
    }

    async fn export_volumes(
        &self,
        vm: &VmRef,
        volumes: Vec<VolumeId>,
        dir: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Vec<VolumeReport<B::Error>> {
        let shared_pipeline = self.pipeline.clone();
        let run_dir = dir.to_path_buf();
        let run_token = cancel.clone();
        let vm_name = vm.name.clone();
        let slots = bounded_fan_out(
            volumes.clone(),
            self.settings.max_parallel_volumes,
            cancel,
            move |volume_id| {
                let pipeline = shared_pipeline.clone();
                let output_dir = run_dir.clone();
                let token = run_token.clone();
                let span = info_span!("volume", vm = %vm_name, volume = %volume_id);
                async move {
                    pipeline
                        .backup_volume(&volume_id, &output_dir, &token)
                        .await
                }
                .instrument(span)
            },
        )
        .await;

        volumes
            .into_iter()
            .zip(slots)
            .map(|(volume_id, slot)| VolumeReport {
                volume_id,
                result: slot.unwrap_or_else(|failure| Err(task_failure(failure))),
            })
            .collect()
    }
}

fn task_failure<E>(failure: TaskFailure) -> PipelineError<E>
where
    E: std::error::Error + 'static,
{
    match failure {
        TaskFailure::Cancelled => PipelineError::Cancelled {
            step: Step::Snapshot,
        },
        TaskFailure::Panicked(message) => PipelineError::Panicked { message },
        lost @ TaskFailure::Lost => PipelineError::Panicked {
            message: lost.to_string(),
        },
    }
}
