//! Wire types for the Keystone, Nova, Cinder, and Glance APIs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct AuthRequest<'a> {
    pub(super) auth: AuthBody<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct AuthBody<'a> {
    pub(super) identity: Identity<'a>,
    pub(super) scope: Scope<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct Identity<'a> {
    pub(super) methods: [&'a str; 1],
    pub(super) password: PasswordMethod<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct PasswordMethod<'a> {
    pub(super) user: PasswordUser<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct PasswordUser<'a> {
    pub(super) name: &'a str,
    pub(super) domain: NamedRef<'a>,
    pub(super) password: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct Scope<'a> {
    pub(super) project: ScopedProject<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct ScopedProject<'a> {
    pub(super) name: &'a str,
    pub(super) domain: NamedRef<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct NamedRef<'a> {
    pub(super) name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TokenResponse {
    #[serde(default)]
    pub(super) token: TokenBody,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TokenBody {
    #[serde(default)]
    pub(super) catalog: Vec<CatalogEntry>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(super) struct CatalogEntry {
    #[serde(default, rename = "type")]
    pub(super) service_type: String,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) endpoints: Vec<CatalogEndpoint>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub(super) struct CatalogEndpoint {
    #[serde(default)]
    pub(super) interface: String,
    #[serde(default)]
    pub(super) region: Option<String>,
    #[serde(default)]
    pub(super) region_id: Option<String>,
    #[serde(default)]
    pub(super) url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerPage {
    #[serde(default)]
    pub(super) servers: Vec<ServerDetail>,
    #[serde(default)]
    pub(super) servers_links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: ServerDetail,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(super) struct ServerDetail {
    #[serde(default)]
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) status: String,
    #[serde(default)]
    pub(super) tags: Vec<String>,
    #[serde(default)]
    pub(super) metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Link {
    #[serde(default)]
    pub(super) rel: String,
    #[serde(default)]
    pub(super) href: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumePage {
    #[serde(default)]
    pub(super) volumes: Vec<VolumeDetail>,
    #[serde(default)]
    pub(super) volumes_links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeEnvelope {
    pub(super) volume: VolumeDetail,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct VolumeDetail {
    #[serde(default)]
    pub(super) id: String,
    #[serde(default)]
    pub(super) size: Option<u64>,
    #[serde(default)]
    pub(super) status: String,
    #[serde(default)]
    pub(super) attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Attachment {
    #[serde(default)]
    pub(super) server_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotEnvelope {
    pub(super) snapshot: StatusObject,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct StatusObject {
    #[serde(default)]
    pub(super) id: String,
    #[serde(default)]
    pub(super) status: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSnapshot<'a> {
    pub(super) snapshot: SnapshotSpec<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct SnapshotSpec<'a> {
    pub(super) volume_id: &'a str,
    pub(super) name: &'a str,
    pub(super) force: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateVolume<'a> {
    pub(super) volume: VolumeSpec<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct VolumeSpec<'a> {
    pub(super) name: &'a str,
    pub(super) snapshot_id: &'a str,
    pub(super) size: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct UploadImage<'a> {
    #[serde(rename = "os-volume_upload_image")]
    pub(super) upload: UploadSpec<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct UploadSpec<'a> {
    pub(super) image_name: &'a str,
    pub(super) disk_format: &'a str,
    pub(super) container_format: &'a str,
    pub(super) force: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct UploadResponse {
    #[serde(rename = "os-volume_upload_image")]
    pub(super) upload: UploadResult,
}

#[derive(Debug, Deserialize)]
pub(super) struct UploadResult {
    pub(super) image_id: String,
}
