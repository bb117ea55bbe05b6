//! Cinder snapshot, volume, and upload calls.

use tracing::debug;

use crate::backend::{CloneRequest, ExportRequest};
use crate::resource::{ResourceId, ResourceKind, VolumeId};

use super::OpenStackBackend;
use super::error::OpenStackError;
use super::types::{
    CreateSnapshot, CreateVolume, SnapshotEnvelope, SnapshotSpec, UploadImage, UploadResponse,
    UploadSpec, VolumeEnvelope, VolumeSpec,
};

const CONTAINER_FORMAT: &str = "bare";

impl OpenStackBackend {
    pub(super) async fn snapshot_volume(
        &self,
        volume_id: &VolumeId,
        name: &str,
    ) -> Result<ResourceId, OpenStackError> {
        let url = format!("{}/snapshots", self.endpoints.volume);
        let body = CreateSnapshot {
            snapshot: SnapshotSpec {
                volume_id: volume_id.as_str(),
                name,
                force: true,
            },
        };
        let created: SnapshotEnvelope = self.api.post_json(&url, &body).await?;
        require_id(&url, created.snapshot.id)
    }

    pub(super) async fn declared_size(
        &self,
        volume_id: &VolumeId,
    ) -> Result<Option<u64>, OpenStackError> {
        let url = format!("{}/volumes/{volume_id}", self.endpoints.volume);
        let envelope: VolumeEnvelope = self.api.get_json(&url, &[]).await?;
        Ok(envelope.volume.size)
    }

    pub(super) async fn clone_snapshot(
        &self,
        request: &CloneRequest,
    ) -> Result<ResourceId, OpenStackError> {
        let url = format!("{}/volumes", self.endpoints.volume);
        let body = CreateVolume {
            volume: VolumeSpec {
                name: &request.name,
                snapshot_id: request.snapshot_id.as_str(),
                size: request.size_gb,
            },
        };
        let created: VolumeEnvelope = self.api.post_json(&url, &body).await?;
        require_id(&url, created.volume.id)
    }

    pub(super) async fn upload_to_image(
        &self,
        request: &ExportRequest,
    ) -> Result<ResourceId, OpenStackError> {
        let url = format!(
            "{}/volumes/{}/action",
            self.endpoints.volume, request.volume_id
        );
        let body = UploadImage {
            upload: UploadSpec {
                image_name: &request.image_name,
                disk_format: request.disk_format.as_str(),
                container_format: CONTAINER_FORMAT,
                force: true,
            },
        };
        let response: UploadResponse = self.api.post_json(&url, &body).await?;
        require_id(&url, response.upload.image_id)
    }

    pub(super) async fn resource_status(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<String, OpenStackError> {
        let url = self.resource_url(kind, id);
        let status = match kind {
            ResourceKind::Snapshot => {
                let envelope: SnapshotEnvelope = self.api.get_json(&url, &[]).await?;
                envelope.snapshot.status
            }
            ResourceKind::Volume => {
                let envelope: VolumeEnvelope = self.api.get_json(&url, &[]).await?;
                envelope.volume.status
            }
            ResourceKind::Image => self.image_status(&url).await?,
        };
        debug!(%kind, %id, status, "fetched status");
        Ok(status)
    }

    pub(super) async fn delete_resource(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<(), OpenStackError> {
        self.api.delete(&self.resource_url(kind, id)).await
    }

    fn resource_url(&self, kind: ResourceKind, id: &ResourceId) -> String {
        match kind {
            ResourceKind::Snapshot => format!("{}/snapshots/{id}", self.endpoints.volume),
            ResourceKind::Volume => format!("{}/volumes/{id}", self.endpoints.volume),
            ResourceKind::Image => format!("{}/images/{id}", self.endpoints.image),
        }
    }
}

fn require_id(url: &str, id: String) -> Result<ResourceId, OpenStackError> {
    if id.trim().is_empty() {
        return Err(OpenStackError::Decode {
            url: url.to_owned(),
            message: "response did not include a resource id".to_owned(),
        });
    }
    Ok(ResourceId::new(id))
}
