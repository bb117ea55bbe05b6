//! Core library for the `ostack-backup` OpenStack backup tool.
//!
//! The crate drives every volume attached to a selected VM through a
//! snapshot, clone, export, and download pipeline, writes the images next to
//! the VM's configuration documents, and releases every temporary resource it
//! created however the pipeline ends. Work fans out across VMs and across the
//! volumes of each VM under independent concurrency limits.

pub mod artifacts;
pub mod backend;
pub mod concurrency;
pub mod config;
pub mod config_store;
pub mod openstack;
pub mod orchestrator;
pub mod pipeline;
pub mod reaper;
pub mod report;
pub mod resource;
pub mod selection;
pub mod settings;
pub mod shutdown;
pub mod test_support;
pub mod vm_backup;
pub mod waiter;

pub use backend::{
    BackendFuture, CloneRequest, ComputeBackend, ExportRequest, ImageSink, StorageBackend,
    VmDocuments, VmRef, VmSummary,
};
pub use config::{BackupConfig, BackupOverrides, ConfigError};
pub use config_store::{ConfigStore, ConfigStoreError, ConfigWriter};
pub use openstack::{OpenStackBackend, OpenStackError};
pub use orchestrator::{BackupOrchestrator, OrchestratorError};
pub use pipeline::{PipelineError, VolumePipeline};
pub use reaper::{Release, ReleaseStack};
pub use report::{RunSummary, SkippedVm, VmReport, VolumeReport};
pub use resource::{DiskFormat, ResourceId, ResourceKind, TemporaryResource, VolumeId};
pub use selection::{VmFilter, VmSelection};
pub use settings::BackupSettings;
pub use vm_backup::{VmBackupUnit, VmError};
pub use waiter::{WaitError, WaitPolicy, wait_for_status};
