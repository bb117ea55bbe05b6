//! Scripted in-memory cloud shared across unit and integration tests.
//!
//! [`FakeCloud`] implements both backend traits without network access. Tests
//! seed VMs and volumes, script the statuses each temporary resource reports,
//! inject failures or panics at individual steps, and then inspect the
//! recorded [`CloudEvent`] log to check what was created and released.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use crate::backend::{
    BackendFuture, CloneRequest, ComputeBackend, ExportRequest, ImageSink, StorageBackend, VmDocuments,
    VmRef, VmSummary,
};
use crate::resource::{ResourceId, ResourceKind, TemporaryResource, VolumeId};
use crate::selection::{VmFilter, is_backup_supported};

/// Default size reported for seeded volumes.
pub const DEFAULT_VOLUME_SIZE_GB: u64 = 10;
/// Default bytes streamed for every exported image.
pub const DEFAULT_IMAGE_PAYLOAD: &[u8] = b"qcow2-image-bytes";

/// Error returned by [`FakeCloud`] when a scripted failure fires.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FakeCloudError {
    /// Raised for an injected failure.
    #[error("injected failure at {step}")]
    Injected {
        /// Step that was told to fail.
        step: String,
    },
    /// Raised when an operation references an unknown object.
    #[error("{what} {id} not found")]
    NotFound {
        /// Object type.
        what: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
}

/// Backend call at which a failure or panic can be injected.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FakeStep {
    /// Snapshot creation.
    Snapshot,
    /// Source volume size lookup.
    VolumeSize,
    /// Volume creation from the snapshot.
    Clone,
    /// Upload of the cloned volume to the image service.
    Export,
    /// Status lookup for a resource of the given kind.
    Status(ResourceKind),
    /// Image download.
    Download,
    /// Deletion of a resource of the given kind.
    Release(ResourceKind),
}

impl std::fmt::Display for FakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::VolumeSize => f.write_str("volume size"),
            Self::Clone => f.write_str("clone"),
            Self::Export => f.write_str("export"),
            Self::Status(kind) => write!(f, "{kind} status"),
            Self::Download => f.write_str("download"),
            Self::Release(kind) => write!(f, "{kind} release"),
        }
    }
}

/// Entry in the recorded call log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CloudEvent {
    /// A temporary resource was created.
    Created {
        /// The resource that now exists.
        resource: TemporaryResource,
        /// Name requested by the caller.
        name: String,
    },
    /// A deletion was attempted.
    Released {
        /// The resource targeted by the deletion.
        resource: TemporaryResource,
        /// Whether the deletion succeeded.
        succeeded: bool,
    },
}

#[derive(Clone, Debug)]
struct FakeVm {
    vm: VmRef,
    status: String,
    volumes: Vec<VolumeId>,
    tags: Vec<String>,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct FakeState {
    vms: Vec<FakeVm>,
    sizes: HashMap<VolumeId, Option<u64>>,
    scripts: HashMap<(VolumeId, ResourceKind), VecDeque<String>>,
    payloads: HashMap<VolumeId, Vec<u8>>,
    failures: HashSet<(VolumeId, FakeStep)>,
    panics: HashSet<(VolumeId, FakeStep)>,
    stalled_downloads: HashSet<VolumeId>,
    failing_vms: HashSet<(String, &'static str)>,
    discovery_fails: bool,
    resources: HashMap<ResourceId, (TemporaryResource, VecDeque<String>)>,
    events: Vec<CloudEvent>,
    next_id: u64,
    live_snapshots: usize,
    peak_snapshots: usize,
    status_polls: usize,
}

impl FakeState {
    fn check(&self, volume: &VolumeId, step: FakeStep) -> Result<(), FakeCloudError> {
        assert!(
            !self.panics.contains(&(volume.clone(), step)),
            "injected panic at {step} for {volume}"
        );
        if self.failures.contains(&(volume.clone(), step)) {
            return Err(FakeCloudError::Injected {
                step: format!("{step} for {volume}"),
            });
        }
        Ok(())
    }

    fn check_vm(&self, vm: &VmRef, call: &'static str) -> Result<(), FakeCloudError> {
        if self.failing_vms.contains(&(vm.id.clone(), call)) {
            return Err(FakeCloudError::Injected {
                step: format!("{call} for {}", vm.name),
            });
        }
        Ok(())
    }

    fn create(&mut self, kind: ResourceKind, volume: &VolumeId, name: &str) -> ResourceId {
        self.next_id += 1;
        let id = ResourceId::new(format!("{kind}-{}", self.next_id));
        let resource = TemporaryResource::new(kind, id.clone(), volume.clone());
        let script = self
            .scripts
            .get(&(volume.clone(), kind))
            .cloned()
            .unwrap_or_else(|| VecDeque::from([kind.ready_status().to_owned()]));
        self.resources
            .insert(id.clone(), (resource.clone(), script));
        self.events.push(CloudEvent::Created {
            resource,
            name: name.to_owned(),
        });
        if kind == ResourceKind::Snapshot {
            self.live_snapshots += 1;
            self.peak_snapshots = self.peak_snapshots.max(self.live_snapshots);
        }
        id
    }

    fn resource(&self, id: &ResourceId) -> Result<TemporaryResource, FakeCloudError> {
        self.resources
            .get(id)
            .map(|(resource, _)| resource.clone())
            .ok_or_else(|| FakeCloudError::NotFound {
                what: "resource",
                id: id.to_string(),
            })
    }

    fn vm(&self, id: &str) -> Option<&FakeVm> {
        self.vms.iter().find(|entry| entry.vm.id == id)
    }
}

/// In-memory implementation of [`StorageBackend`] and [`ComputeBackend`].
///
/// Clones share state, so a test can keep a handle for assertions while the
/// orchestrator owns another.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
    latency: Duration,
}

impl FakeCloud {
    /// Creates an empty cloud with no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every backend call by `latency` so concurrent work overlaps.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }

    /// Seeds an `ACTIVE` VM with the given attached volumes.
    pub fn add_vm(&self, name: &str, id: &str, volumes: &[&str]) {
        self.add_vm_with_status(name, id, "ACTIVE", volumes);
    }

    /// Seeds a VM in an explicit status.
    pub fn add_vm_with_status(&self, name: &str, id: &str, status: &str, volumes: &[&str]) {
        let mut state = self.lock();
        for volume in volumes {
            state
                .sizes
                .entry(VolumeId::from(*volume))
                .or_insert(Some(DEFAULT_VOLUME_SIZE_GB));
        }
        state.vms.push(FakeVm {
            vm: VmRef::new(name, id),
            status: status.to_owned(),
            volumes: volumes.iter().copied().map(VolumeId::from).collect(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        });
    }

    /// Attaches server tags to a seeded VM.
    pub fn tag_vm(&self, id: &str, tags: &[&str]) {
        let mut state = self.lock();
        if let Some(entry) = state.vms.iter_mut().find(|entry| entry.vm.id == id) {
            entry.tags.extend(tags.iter().map(|tag| (*tag).to_owned()));
        }
    }

    /// Adds a metadata entry to a seeded VM.
    pub fn set_vm_metadata(&self, id: &str, key: &str, value: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.vms.iter_mut().find(|entry| entry.vm.id == id) {
            entry.metadata.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Overrides the size reported for `volume`; `None` means unreported.
    pub fn set_volume_size(&self, volume: &str, size_gb: Option<u64>) {
        self.lock().sizes.insert(VolumeId::from(volume), size_gb);
    }

    /// Scripts the statuses reported for the `kind` resource created for
    /// `volume`. The last entry repeats once the script is exhausted.
    pub fn script_status(&self, volume: &str, kind: ResourceKind, statuses: &[&str]) {
        self.lock().scripts.insert(
            (VolumeId::from(volume), kind),
            statuses.iter().map(|status| (*status).to_owned()).collect(),
        );
    }

    /// Sets the bytes streamed when the image for `volume` is downloaded.
    pub fn set_image_payload(&self, volume: &str, payload: &[u8]) {
        self.lock()
            .payloads
            .insert(VolumeId::from(volume), payload.to_vec());
    }

    /// Makes `step` fail for `volume`.
    pub fn fail_at(&self, volume: &str, step: FakeStep) {
        self.lock().failures.insert((VolumeId::from(volume), step));
    }

    /// Makes `step` panic for `volume`.
    pub fn panic_at(&self, volume: &str, step: FakeStep) {
        self.lock().panics.insert((VolumeId::from(volume), step));
    }

    /// Makes the download for `volume` write half its payload and then hang.
    pub fn stall_download(&self, volume: &str) {
        self.lock().stalled_downloads.insert(VolumeId::from(volume));
    }

    /// Makes document retrieval fail for the VM with `id`.
    pub fn fail_documents(&self, id: &str) {
        self.lock().failing_vms.insert((id.to_owned(), "documents"));
    }

    /// Makes attached-volume listing fail for the VM with `id`.
    pub fn fail_volume_listing(&self, id: &str) {
        self.lock().failing_vms.insert((id.to_owned(), "volumes"));
    }

    /// Makes the describe call fail for the VM with `id`.
    pub fn fail_describe(&self, id: &str) {
        self.lock().failing_vms.insert((id.to_owned(), "describe"));
    }

    /// Makes VM discovery fail.
    pub fn fail_discovery(&self) {
        self.lock().discovery_fails = true;
    }

    /// Returns the recorded call log.
    #[must_use]
    pub fn events(&self) -> Vec<CloudEvent> {
        self.lock().events.clone()
    }

    /// Kinds created for `volume`, in creation order.
    #[must_use]
    pub fn created_for(&self, volume: &str) -> Vec<ResourceKind> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                CloudEvent::Created { resource, .. } if resource.volume.as_str() == volume => {
                    Some(resource.kind)
                }
                _ => None,
            })
            .collect()
    }

    /// Kinds whose deletion was attempted for `volume`, in attempt order.
    #[must_use]
    pub fn releases_for(&self, volume: &str) -> Vec<ResourceKind> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                CloudEvent::Released { resource, .. } if resource.volume.as_str() == volume => {
                    Some(resource.kind)
                }
                _ => None,
            })
            .collect()
    }

    /// Names requested for resources created for `volume`.
    #[must_use]
    pub fn names_for(&self, volume: &str) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                CloudEvent::Created { resource, name } if resource.volume.as_str() == volume => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Resources created but not successfully released.
    #[must_use]
    pub fn live_resources(&self) -> Vec<TemporaryResource> {
        let state = self.lock();
        let released: HashSet<&ResourceId> = state
            .events
            .iter()
            .filter_map(|event| match event {
                CloudEvent::Released {
                    resource,
                    succeeded: true,
                } => Some(&resource.id),
                _ => None,
            })
            .collect();
        state
            .events
            .iter()
            .filter_map(|event| match event {
                CloudEvent::Created { resource, .. } if !released.contains(&resource.id) => {
                    Some(resource.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Highest number of snapshots that existed at the same time.
    #[must_use]
    pub fn peak_concurrent_snapshots(&self) -> usize {
        self.lock().peak_snapshots
    }

    /// Total number of status lookups served.
    #[must_use]
    pub fn status_polls(&self) -> usize {
        self.lock().status_polls
    }

    fn create_resource(
        &self,
        kind: ResourceKind,
        volume: &VolumeId,
        name: &str,
        step: FakeStep,
    ) -> Result<ResourceId, FakeCloudError> {
        let mut state = self.lock();
        state.check(volume, step)?;
        Ok(state.create(kind, volume, name))
    }
}

impl StorageBackend for FakeCloud {
    type Error = FakeCloudError;

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a VolumeId,
        name: &'a str,
    ) -> BackendFuture<'a, ResourceId, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            self.create_resource(ResourceKind::Snapshot, volume_id, name, FakeStep::Snapshot)
        })
    }

    fn volume_size<'a>(
        &'a self,
        volume_id: &'a VolumeId,
    ) -> BackendFuture<'a, Option<u64>, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let state = self.lock();
            state.check(volume_id, FakeStep::VolumeSize)?;
            state
                .sizes
                .get(volume_id)
                .copied()
                .ok_or_else(|| FakeCloudError::NotFound {
                    what: "volume",
                    id: volume_id.to_string(),
                })
        })
    }

    fn create_volume_from_snapshot<'a>(
        &'a self,
        request: &'a CloneRequest,
    ) -> BackendFuture<'a, ResourceId, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let volume = self.lock().resource(&request.snapshot_id)?.volume;
            self.create_resource(ResourceKind::Volume, &volume, &request.name, FakeStep::Clone)
        })
    }

    fn export_image<'a>(
        &'a self,
        request: &'a ExportRequest,
    ) -> BackendFuture<'a, ResourceId, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let volume = self.lock().resource(&request.volume_id)?.volume;
            self.create_resource(
                ResourceKind::Image,
                &volume,
                &request.image_name,
                FakeStep::Export,
            )
        })
    }

    fn status<'a>(
        &'a self,
        kind: ResourceKind,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.status_polls += 1;
            let volume = state.resource(id)?.volume;
            state.check(&volume, FakeStep::Status(kind))?;
            let script = state
                .resources
                .get_mut(id)
                .map(|(_, script)| script)
                .ok_or_else(|| FakeCloudError::NotFound {
                    what: "resource",
                    id: id.to_string(),
                })?;
            let status = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            Ok(status.unwrap_or_else(|| kind.ready_status().to_owned()))
        })
    }

    fn delete<'a>(
        &'a self,
        kind: ResourceKind,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            let resource = state.resource(id)?;
            let outcome = state.check(&resource.volume, FakeStep::Release(kind));
            let succeeded = outcome.is_ok();
            if succeeded && kind == ResourceKind::Snapshot {
                state.live_snapshots = state.live_snapshots.saturating_sub(1);
            }
            state.events.push(CloudEvent::Released {
                resource,
                succeeded,
            });
            outcome
        })
    }

    fn download_image<'a>(
        &'a self,
        image_id: &'a ResourceId,
        sink: ImageSink<'a>,
    ) -> BackendFuture<'a, u64, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let (payload, failure, stalled) = {
                let state = self.lock();
                let volume = state.resource(image_id)?.volume;
                let payload = state
                    .payloads
                    .get(&volume)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_IMAGE_PAYLOAD.to_vec());
                let stalled = state.stalled_downloads.contains(&volume);
                (payload, state.check(&volume, FakeStep::Download).err(), stalled)
            };
            let io_error = |err: std::io::Error| FakeCloudError::Injected {
                step: format!("download write: {err}"),
            };
            if stalled {
                let partial = payload.get(..payload.len().div_ceil(2)).unwrap_or_default();
                sink.write_all(partial).await.map_err(io_error)?;
                sink.flush().await.map_err(io_error)?;
                return std::future::pending().await;
            }
            if let Some(err) = failure {
                let partial = payload.get(..payload.len().div_ceil(2)).unwrap_or_default();
                sink.write_all(partial).await.map_err(io_error)?;
                return Err(err);
            }
            sink.write_all(&payload).await.map_err(io_error)?;
            Ok(u64::try_from(payload.len()).unwrap_or(u64::MAX))
        })
    }
}

impl ComputeBackend for FakeCloud {
    fn discover_vms<'a>(
        &'a self,
        filter: &'a VmFilter,
    ) -> BackendFuture<'a, Vec<VmRef>, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let state = self.lock();
            if state.discovery_fails {
                return Err(FakeCloudError::Injected {
                    step: String::from("discovery"),
                });
            }
            Ok(state
                .vms
                .iter()
                .filter(|entry| is_backup_supported(&entry.status))
                .filter(|entry| filter.matches_name(&entry.vm.name))
                .filter(|entry| filter.matches_tags(&entry.tags, &entry.metadata))
                .map(|entry| entry.vm.clone())
                .collect())
        })
    }

    fn find_vm<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Option<VmRef>, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            Ok(self
                .lock()
                .vms
                .iter()
                .find(|entry| entry.vm.name == name)
                .map(|entry| entry.vm.clone()))
        })
    }

    fn describe_vm<'a>(
        &'a self,
        id: &'a str,
    ) -> BackendFuture<'a, Option<VmSummary>, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let state = self.lock();
            let Some(entry) = state.vm(id) else {
                return Ok(None);
            };
            state.check_vm(&entry.vm, "describe")?;
            Ok(Some(VmSummary {
                id: entry.vm.id.clone(),
                name: entry.vm.name.clone(),
                status: entry.status.clone(),
            }))
        })
    }

    fn attached_volumes<'a>(
        &'a self,
        vm: &'a VmRef,
    ) -> BackendFuture<'a, Vec<VolumeId>, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let state = self.lock();
            state.check_vm(vm, "volumes")?;
            state
                .vm(&vm.id)
                .map(|entry| entry.volumes.clone())
                .ok_or_else(|| FakeCloudError::NotFound {
                    what: "server",
                    id: vm.id.clone(),
                })
        })
    }

    fn vm_documents<'a>(&'a self, vm: &'a VmRef) -> BackendFuture<'a, VmDocuments, Self::Error> {
        Box::pin(async move {
            self.pause().await;
            let state = self.lock();
            state.check_vm(vm, "documents")?;
            let entry = state.vm(&vm.id).ok_or_else(|| FakeCloudError::NotFound {
                what: "server",
                id: vm.id.clone(),
            })?;
            let metadata: serde_json::Map<String, Value> = entry
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            Ok(VmDocuments {
                config: json!({
                    "server": {
                        "id": entry.vm.id,
                        "name": entry.vm.name,
                        "status": entry.status,
                    }
                }),
                tags: Some(json!({ "tags": entry.tags })),
                metadata: Some(json!({ "metadata": metadata })),
            })
        })
    }
}
