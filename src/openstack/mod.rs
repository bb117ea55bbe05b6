//! OpenStack implementation of the backup backend traits.
//!
//! Authenticates against Keystone v3 with password credentials and talks to
//! Nova, Cinder v3, and Glance v2 over their REST APIs. Endpoints come from
//! the token's service catalog unless the configuration overrides them.

mod auth;
mod block_storage;
mod catalog;
mod compute;
mod error;
mod http;
mod image;
mod types;

use tracing::info;

use crate::backend::{
    BackendFuture, CloneRequest, ComputeBackend, ExportRequest, ImageSink, StorageBackend,
    VmDocuments, VmRef, VmSummary,
};
use crate::config::BackupConfig;
use crate::resource::{ResourceId, ResourceKind, VolumeId};
use crate::selection::VmFilter;

pub use error::OpenStackError;

use auth::Credentials;
use catalog::Endpoints;
use http::ApiClient;

/// Backend backed by a live OpenStack cloud.
#[derive(Debug)]
pub struct OpenStackBackend {
    api: ApiClient,
    endpoints: Endpoints,
}

impl OpenStackBackend {
    /// Authenticates with Keystone and resolves the service endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`OpenStackError::Auth`] when Keystone rejects the credentials
    /// and [`OpenStackError::EndpointNotFound`] when a required service is
    /// missing from the catalog and not configured explicitly.
    pub async fn connect(config: &BackupConfig) -> Result<Self, OpenStackError> {
        config.validate()?;
        let credentials = Credentials::from_config(config);
        let (api, issued) = ApiClient::connect(credentials, config.request_timeout()).await?;
        let endpoints = Endpoints::resolve(&issued.catalog, config)?;
        info!(
            compute = %endpoints.compute,
            volume = %endpoints.volume,
            image = %endpoints.image,
            "connected to openstack"
        );
        Ok(Self { api, endpoints })
    }
}

impl StorageBackend for OpenStackBackend {
    type Error = OpenStackError;

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a VolumeId,
        name: &'a str,
    ) -> BackendFuture<'a, ResourceId, Self::Error> {
        Box::pin(self.snapshot_volume(volume_id, name))
    }

    fn volume_size<'a>(
        &'a self,
        volume_id: &'a VolumeId,
    ) -> BackendFuture<'a, Option<u64>, Self::Error> {
        Box::pin(self.declared_size(volume_id))
    }

    fn create_volume_from_snapshot<'a>(
        &'a self,
        request: &'a CloneRequest,
    ) -> BackendFuture<'a, ResourceId, Self::Error> {
        Box::pin(self.clone_snapshot(request))
    }

    fn export_image<'a>(
        &'a self,
        request: &'a ExportRequest,
    ) -> BackendFuture<'a, ResourceId, Self::Error> {
        Box::pin(self.upload_to_image(request))
    }

    fn status<'a>(
        &'a self,
        kind: ResourceKind,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(self.resource_status(kind, id))
    }

    fn delete<'a>(
        &'a self,
        kind: ResourceKind,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.delete_resource(kind, id))
    }

    fn download_image<'a>(
        &'a self,
        image_id: &'a ResourceId,
        sink: ImageSink<'a>,
    ) -> BackendFuture<'a, u64, Self::Error> {
        Box::pin(self.stream_image(image_id, sink))
    }
}

impl ComputeBackend for OpenStackBackend {
    fn discover_vms<'a>(
        &'a self,
        filter: &'a VmFilter,
    ) -> BackendFuture<'a, Vec<VmRef>, Self::Error> {
        Box::pin(self.discover(filter))
    }

    fn find_vm<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Option<VmRef>, Self::Error> {
        Box::pin(self.find_server(name))
    }

    fn describe_vm<'a>(
        &'a self,
        id: &'a str,
    ) -> BackendFuture<'a, Option<VmSummary>, Self::Error> {
        Box::pin(self.describe(id))
    }

    fn attached_volumes<'a>(
        &'a self,
        vm: &'a VmRef,
    ) -> BackendFuture<'a, Vec<VolumeId>, Self::Error> {
        Box::pin(self.volumes_attached_to(vm))
    }

    fn vm_documents<'a>(&'a self, vm: &'a VmRef) -> BackendFuture<'a, VmDocuments, Self::Error> {
        Box::pin(self.documents(vm))
    }
}
