//! Outcome records for a backup run.

use camino::Utf8PathBuf;

use crate::backend::VmRef;
use crate::pipeline::PipelineError;
use crate::resource::VolumeId;
use crate::vm_backup::VmError;

/// Outcome of one volume export.
#[derive(Debug)]
pub struct VolumeReport<E>
where
    E: std::error::Error + 'static,
{
    /// Exported volume.
    pub volume_id: VolumeId,
    /// Image path on success.
    pub result: Result<Utf8PathBuf, PipelineError<E>>,
}

/// Outcome of one VM backup unit.
#[derive(Debug)]
pub struct VmReport<E>
where
    E: std::error::Error + 'static,
{
    /// VM that was backed up.
    pub vm: VmRef,
    /// Run directory, when it could be created.
    pub directory: Option<Utf8PathBuf>,
    /// One entry per attached volume.
    pub volumes: Vec<VolumeReport<E>>,
    /// Aggregate verdict for the VM.
    pub result: Result<(), VmError<E>>,
}

impl<E> VmReport<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when the VM and every volume succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// Number of volumes whose export failed.
    #[must_use]
    pub fn failed_volumes(&self) -> usize {
        self.volumes
            .iter()
            .filter(|volume| volume.result.is_err())
            .count()
    }
}

/// A VM that was selected but not scheduled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkippedVm {
    /// Name or id the VM was selected by.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunSummary<E>
where
    E: std::error::Error + 'static,
{
    /// One report per scheduled VM, in scheduling order.
    pub vms: Vec<VmReport<E>>,
    /// VMs dropped during resolution or validation.
    pub skipped: Vec<SkippedVm>,
}

impl<E> Default for RunSummary<E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self {
            vms: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<E> RunSummary<E>
where
    E: std::error::Error + 'static,
{
    /// Number of scheduled VMs.
    #[must_use]
    pub fn total_vms(&self) -> usize {
        self.vms.len()
    }

    /// Number of scheduled VMs whose backup failed.
    #[must_use]
    pub fn failed_vms(&self) -> usize {
        self.vms.iter().filter(|vm| !vm.succeeded()).count()
    }

    /// Returns `true` when every scheduled VM succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failed_vms() == 0
    }

    /// Looks up the report for the VM named `name`.
    #[must_use]
    pub fn vm(&self, name: &str) -> Option<&VmReport<E>> {
        self.vms.iter().find(|report| report.vm.name == name)
    }

    /// Renders a per-VM, per-volume summary for the terminal.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for report in &self.vms {
            let verdict = match &report.result {
                Ok(()) => String::from("ok"),
                Err(err) => format!("FAILED: {err}"),
            };
            lines.push(format!("{} ({}): {verdict}", report.vm.name, report.vm.id));
            lines.extend(report.volumes.iter().map(|volume| match &volume.result {
                Ok(path) => format!("  {}: ok -> {path}", volume.volume_id),
                Err(err) => format!("  {}: FAILED: {err}", volume.volume_id),
            }));
        }
        lines.extend(
            self.skipped
                .iter()
                .map(|skipped| format!("{}: skipped ({})", skipped.name, skipped.reason)),
        );
        lines.push(format!(
            "{} of {} VM backups succeeded",
            self.total_vms().saturating_sub(self.failed_vms()),
            self.total_vms()
        ));
        lines.join("\n")
    }
}
