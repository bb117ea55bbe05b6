//! Errors raised by a single volume export.

use std::fmt;
use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::resource::VolumeId;
use crate::waiter::WaitError;

/// Pipeline stage, used to attribute request failures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Step {
    /// Forced snapshot of the source volume.
    Snapshot,
    /// Lookup of the source volume size.
    VolumeSize,
    /// Volume creation from the snapshot.
    Clone,
    /// Upload of the clone to the image service.
    Export,
    /// Streaming of the image to disk.
    Download,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Snapshot => "create snapshot",
            Self::VolumeSize => "read volume size",
            Self::Clone => "create volume from snapshot",
            Self::Export => "upload volume to image",
            Self::Download => "download image",
        })
    }
}

/// Errors that abort the export of one volume.
#[derive(Debug, Error)]
pub enum PipelineError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when a backend request fails.
    #[error("{step} failed: {source}")]
    Request {
        /// Stage that issued the request.
        step: Step,
        /// Backend error.
        #[source]
        source: E,
    },
    /// Raised when a resource never becomes ready.
    #[error(transparent)]
    Wait(#[from] WaitError<E>),
    /// Raised when the source volume reports no usable size.
    #[error("volume {volume} reports invalid size {}", .size.map_or_else(|| String::from("<none>"), |gb| format!("{gb} GB")))]
    InvalidVolumeSize {
        /// Source volume.
        volume: VolumeId,
        /// Reported size, if any.
        size: Option<u64>,
    },
    /// Raised when the image stream contained no bytes.
    #[error("downloaded image {path} is empty")]
    EmptyDownload {
        /// Destination that was removed.
        path: Utf8PathBuf,
    },
    /// Raised when the local image file cannot be written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Raised when the run is cancelled before or during a step.
    #[error("cancelled during {step}")]
    Cancelled {
        /// Stage that was interrupted.
        step: Step,
    },
    /// Raised when a step panicked.
    #[error("volume export panicked: {message}")]
    Panicked {
        /// Panic message.
        message: String,
    },
}
