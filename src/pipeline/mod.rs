//! Export of one attached volume to a local disk image.
//!
//! The sequence is snapshot → wait → clone → wait → upload → wait → download.
//! Every temporary resource is recorded on a [`ReleaseStack`] the moment the
//! provider returns its id, and the stack is drained once the sequence ends,
//! whether it succeeded, failed, was cancelled, or panicked.

mod error;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use futures::FutureExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use self::error::{PipelineError, Step};
use crate::artifacts;
use crate::backend::{BackendFuture, CloneRequest, ExportRequest, ImageSink, StorageBackend};
use crate::concurrency::panic_message;
use crate::reaper::ReleaseStack;
use crate::resource::{ResourceId, ResourceKind, TemporaryResource, VolumeId};
use crate::settings::BackupSettings;
use crate::waiter::wait_for_status;

/// Timestamp embedded in temporary resource names.
const RESOURCE_STAMP_FORMAT: &str = "%Y-%m-%d_%H%M";

/// Names of the temporary resources created for one export.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceNames {
    /// Snapshot name, `snap-<volume>-<stamp>`.
    pub snapshot: String,
    /// Cloned volume name, `tmp-<volume>-<stamp>`.
    pub volume: String,
    /// Image name, `img-<volume>-<stamp>`.
    pub image: String,
}

impl ResourceNames {
    /// Builds the names for `volume` using the given timestamp.
    #[must_use]
    pub fn new(volume: &VolumeId, stamp: &str) -> Self {
        Self {
            snapshot: format!("snap-{volume}-{stamp}"),
            volume: format!("tmp-{volume}-{stamp}"),
            image: format!("img-{volume}-{stamp}"),
        }
    }

    /// Builds the names for `volume` stamped with the current local time.
    #[must_use]
    pub fn now(volume: &VolumeId) -> Self {
        Self::new(volume, &Local::now().format(RESOURCE_STAMP_FORMAT).to_string())
    }
}

/// Drives the export of single volumes against a storage backend.
pub struct VolumePipeline<B> {
    backend: Arc<B>,
    settings: Arc<BackupSettings>,
}

impl<B> Clone for VolumePipeline<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<B> VolumePipeline<B>
where
    B: StorageBackend,
{
    /// Creates a pipeline sharing `backend` and `settings`.
    #[must_use]
    pub const fn new(backend: Arc<B>, settings: Arc<BackupSettings>) -> Self {
        Self { backend, settings }
    }

    /// Exports `volume_id` into `output_dir` and returns the image path.
    ///
    /// Temporary resources are released in reverse creation order before
    /// this returns, regardless of the outcome. Release does not observe
    /// `cancel`; each deletion is bounded by the cleanup grace period.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] of the first step that failed.
    pub async fn backup_volume(
        &self,
        volume_id: &VolumeId,
        output_dir: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<Utf8PathBuf, PipelineError<B::Error>> {
        let destination =
            artifacts::image_path(output_dir, volume_id, self.settings.disk_format);
        let mut created = ReleaseStack::new();

        let outcome = AssertUnwindSafe(self.run_steps(volume_id, &destination, cancel, &mut created))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(PipelineError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        if matches!(outcome, Err(PipelineError::Panicked { .. })) {
            artifacts::discard(&destination).await;
        }
        if !created.is_empty() {
            debug!(volume = %volume_id, count = created.len(), "releasing temporary resources");
        }
        created
            .release_all(self.backend.as_ref(), self.settings.cleanup_grace)
            .await;

        match &outcome {
            Ok(path) => info!(volume = %volume_id, %path, "volume backup complete"),
            Err(err) => warn!(volume = %volume_id, error = %err, "volume backup failed"),
        }
        outcome
    }

    async fn run_steps(
        &self,
        volume_id: &VolumeId,
        destination: &Utf8Path,
        cancel: &CancellationToken,
        created: &mut ReleaseStack,
    ) -> Result<Utf8PathBuf, PipelineError<B::Error>> {
        let names = ResourceNames::now(volume_id);

        ensure_live(Step::Snapshot, cancel)?;
        let snapshot = self
            .backend
            .create_snapshot(volume_id, &names.snapshot)
            .await
            .map_err(|source| PipelineError::Request {
                step: Step::Snapshot,
                source,
            })?;
        record(created, ResourceKind::Snapshot, &snapshot, volume_id);
        self.wait_ready(ResourceKind::Snapshot, &snapshot, cancel)
            .await?;

        let size = interruptible(Step::VolumeSize, cancel, self.backend.volume_size(volume_id))
            .await?;
        let size_gb = match size {
            Some(gb) if gb > 0 => gb,
            other => {
                return Err(PipelineError::InvalidVolumeSize {
                    volume: volume_id.clone(),
                    size: other,
                });
            }
        };

        ensure_live(Step::Clone, cancel)?;
        let clone = self
            .backend
            .create_volume_from_snapshot(&CloneRequest {
                name: names.volume,
                snapshot_id: snapshot,
                size_gb,
            })
            .await
            .map_err(|source| PipelineError::Request {
                step: Step::Clone,
                source,
            })?;
        record(created, ResourceKind::Volume, &clone, volume_id);
        self.wait_ready(ResourceKind::Volume, &clone, cancel).await?;

        ensure_live(Step::Export, cancel)?;
        let image = self
            .backend
            .export_image(&ExportRequest {
                volume_id: clone,
                image_name: names.image,
                disk_format: self.settings.disk_format,
            })
            .await
            .map_err(|source| PipelineError::Request {
                step: Step::Export,
                source,
            })?;
        record(created, ResourceKind::Image, &image, volume_id);
        self.wait_ready(ResourceKind::Image, &image, cancel).await?;

        ensure_live(Step::Download, cancel)?;
        self.download(&image, destination, cancel).await?;
        Ok(destination.to_path_buf())
    }

    async fn wait_ready(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError<B::Error>> {
        wait_for_status(
            self.backend.as_ref(),
            kind,
            id,
            kind.ready_status(),
            &self.settings.wait,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn download(
        &self,
        image: &ResourceId,
        destination: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError<B::Error>> {
        let written = self.stream_to_file(image, destination, cancel).await;
        match written {
            Ok(0) => {
                artifacts::discard(destination).await;
                Err(PipelineError::EmptyDownload {
                    path: destination.to_path_buf(),
                })
            }
            Ok(bytes) => {
                info!(%image, path = %destination, bytes, "image downloaded");
                Ok(())
            }
            Err(err) => {
                artifacts::discard(destination).await;
                Err(err)
            }
        }
    }

    async fn stream_to_file(
        &self,
        image: &ResourceId,
        destination: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError<B::Error>> {
        let io_error = |source| PipelineError::Io {
            path: destination.to_path_buf(),
            source,
        };
        let file = File::create(destination).await.map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        let bytes = {
            let sink: ImageSink<'_> = &mut writer;
            interruptible(Step::Download, cancel, self.backend.download_image(image, sink)).await?
        };
        writer.flush().await.map_err(io_error)?;
        Ok(bytes)
    }
}

fn record(created: &mut ReleaseStack, kind: ResourceKind, id: &ResourceId, volume_id: &VolumeId) {
    info!(volume = %volume_id, %kind, %id, "created temporary {kind}");
    created.push(TemporaryResource::new(kind, id.clone(), volume_id.clone()));
}

fn ensure_live<E>(step: Step, cancel: &CancellationToken) -> Result<(), PipelineError<E>>
where
    E: std::error::Error + 'static,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { step });
    }
    Ok(())
}

async fn interruptible<T, E>(
    step: Step,
    cancel: &CancellationToken,
    request: BackendFuture<'_, T, E>,
) -> Result<T, PipelineError<E>>
where
    E: std::error::Error + 'static,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PipelineError::Cancelled { step }),
        outcome = request => outcome.map_err(|source| PipelineError::Request { step, source }),
    }
}
