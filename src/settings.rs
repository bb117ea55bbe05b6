//! Resolved run parameters handed to the engine.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::reaper::DEFAULT_CLEANUP_GRACE;
use crate::resource::DiskFormat;
use crate::waiter::WaitPolicy;

/// Default root of the backup tree.
pub const DEFAULT_BACKUP_DIR: &str = "/backup/openstack";

/// Everything the orchestrator needs besides the backend and the selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupSettings {
    /// Root directory receiving one subdirectory per VM.
    pub backup_dir: Utf8PathBuf,
    /// Format requested from the image service and used as file extension.
    pub disk_format: DiskFormat,
    /// Timeout and poll interval applied to every status wait.
    pub wait: WaitPolicy,
    /// Time allowed for each deletion of a temporary resource.
    pub cleanup_grace: Duration,
    /// Maximum VMs backed up at once; `0` means unbounded.
    pub max_parallel_vms: usize,
    /// Maximum volumes exported at once within one VM; `0` means unbounded.
    pub max_parallel_volumes: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            backup_dir: Utf8PathBuf::from(DEFAULT_BACKUP_DIR),
            disk_format: DiskFormat::default(),
            wait: WaitPolicy::default(),
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
            max_parallel_vms: 0,
            max_parallel_volumes: 0,
        }
    }
}
