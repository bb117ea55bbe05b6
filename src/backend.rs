//! Backend abstraction over the cloud services a backup run talks to.
//!
//! [`StorageBackend`] covers the block-storage and image primitives the
//! volume pipeline drives; [`ComputeBackend`] adds the VM-level lookups used
//! by the orchestrator. Every create call returns an identifier immediately;
//! completion is only observable by polling [`StorageBackend::status`].

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::AsyncWrite;

use crate::resource::{DiskFormat, ResourceId, ResourceKind, VolumeId};
use crate::selection::VmFilter;

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Destination for streamed image bytes.
pub type ImageSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// A VM selected for backup.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VmRef {
    /// Human readable server name.
    pub name: String,
    /// Provider-assigned server identifier.
    pub id: String,
}

impl VmRef {
    /// Creates a VM reference.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Identity fields reported by the compute service for one server.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VmSummary {
    /// Server identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Server status (for example `ACTIVE`).
    pub status: String,
}

impl VmSummary {
    /// Returns `true` when the server exposes a non-empty id, name, and status.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty() && !self.status.trim().is_empty()
    }
}

/// Configuration documents preserved alongside a VM's disk images.
#[derive(Clone, Debug, PartialEq)]
pub struct VmDocuments {
    /// Full server description.
    pub config: Value,
    /// Server tags, when the compute service returned them.
    pub tags: Option<Value>,
    /// Server metadata, when the compute service returned it.
    pub metadata: Option<Value>,
}

/// Parameters for materialising a volume from a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloneRequest {
    /// Name given to the new volume.
    pub name: String,
    /// Snapshot the volume is created from.
    pub snapshot_id: ResourceId,
    /// Size in gigabytes, identical to the source volume.
    pub size_gb: u64,
}

/// Parameters for uploading a volume to the image service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportRequest {
    /// Volume whose contents are uploaded.
    pub volume_id: ResourceId,
    /// Name given to the new image.
    pub image_name: String,
    /// Disk format of the resulting image.
    pub disk_format: DiskFormat,
}

/// Block-storage and image primitives used by the volume pipeline.
pub trait StorageBackend: Send + Sync {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a forced snapshot of `volume_id`.
    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a VolumeId,
        name: &'a str,
    ) -> BackendFuture<'a, ResourceId, Self::Error>;

    /// Returns the declared size of `volume_id` in gigabytes, if reported.
    fn volume_size<'a>(
        &'a self,
        volume_id: &'a VolumeId,
    ) -> BackendFuture<'a, Option<u64>, Self::Error>;

    /// Creates a new volume from a snapshot.
    fn create_volume_from_snapshot<'a>(
        &'a self,
        request: &'a CloneRequest,
    ) -> BackendFuture<'a, ResourceId, Self::Error>;

    /// Uploads a volume to the image service and returns the image id.
    fn export_image<'a>(
        &'a self,
        request: &'a ExportRequest,
    ) -> BackendFuture<'a, ResourceId, Self::Error>;

    /// Fetches the current status string of a temporary resource.
    fn status<'a>(
        &'a self,
        kind: ResourceKind,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, String, Self::Error>;

    /// Deletes a temporary resource. Deleting an absent resource succeeds.
    fn delete<'a>(
        &'a self,
        kind: ResourceKind,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Streams the binary contents of an image into `sink`, returning the
    /// number of bytes written.
    fn download_image<'a>(
        &'a self,
        image_id: &'a ResourceId,
        sink: ImageSink<'a>,
    ) -> BackendFuture<'a, u64, Self::Error>;
}

/// VM-level lookups used to decide what to back up.
pub trait ComputeBackend: StorageBackend {
    /// Lists servers in a backup-supported status that match `filter`.
    fn discover_vms<'a>(
        &'a self,
        filter: &'a VmFilter,
    ) -> BackendFuture<'a, Vec<VmRef>, Self::Error>;

    /// Resolves a server name to a reference, or `None` when absent.
    fn find_vm<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Option<VmRef>, Self::Error>;

    /// Describes a server by id, or `None` when it does not exist.
    fn describe_vm<'a>(&'a self, id: &'a str)
    -> BackendFuture<'a, Option<VmSummary>, Self::Error>;

    /// Lists the ids of volumes currently attached to `vm`.
    fn attached_volumes<'a>(
        &'a self,
        vm: &'a VmRef,
    ) -> BackendFuture<'a, Vec<VolumeId>, Self::Error>;

    /// Fetches the configuration, tags, and metadata of `vm`.
    fn vm_documents<'a>(&'a self, vm: &'a VmRef) -> BackendFuture<'a, VmDocuments, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("id", "web-01", "ACTIVE", true)]
    #[case("", "web-01", "ACTIVE", false)]
    #[case("id", " ", "ACTIVE", false)]
    #[case("id", "web-01", "", false)]
    fn summary_completeness_requires_all_fields(
        #[case] id: &str,
        #[case] name: &str,
        #[case] status: &str,
        #[case] expected: bool,
    ) {
        let summary = VmSummary {
            id: id.to_owned(),
            name: name.to_owned(),
            status: status.to_owned(),
        };
        assert_eq!(summary.is_complete(), expected);
    }
}
