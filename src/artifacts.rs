//! On-disk layout of a backup run.
//!
//! Each VM gets `<backup_dir>/<vm name>/<YYYY-MM-DD_HH-MM>/` holding one image
//! per volume plus the server's configuration, tags, and metadata.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::VmDocuments;
use crate::resource::{DiskFormat, VolumeId};

/// Server description file name.
pub const CONFIG_FILE: &str = "vm-config.json";
/// Server tags file name.
pub const TAGS_FILE: &str = "vm-tags.json";
/// Server metadata file name.
pub const METADATA_FILE: &str = "vm-metadata.json";

const RUN_DIRECTORY_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// Errors raised while writing run artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Raised when a file or directory cannot be written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path that failed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Raised when a document cannot be rendered as JSON.
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Destination path.
        path: Utf8PathBuf,
        /// Serialisation error.
        #[source]
        source: serde_json::Error,
    },
}

/// Replaces characters that would escape the backup directory.
#[must_use]
pub fn directory_name(vm_name: &str) -> String {
    let cleaned: String = vm_name
        .trim()
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\' | '\0') { '_' } else { ch })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => String::from("_"),
        _ => cleaned,
    }
}

/// Path of the run directory for `vm_name` started at `at`.
#[must_use]
pub fn run_directory(base: &Utf8Path, vm_name: &str, at: DateTime<Local>) -> Utf8PathBuf {
    base.join(directory_name(vm_name))
        .join(at.format(RUN_DIRECTORY_FORMAT).to_string())
}

/// Creates the run directory for `vm_name`, timestamped now.
///
/// # Errors
///
/// Returns [`ArtifactError::Io`] when the directory cannot be created.
pub async fn create_run_directory(
    base: &Utf8Path,
    vm_name: &str,
) -> Result<Utf8PathBuf, ArtifactError> {
    let dir = run_directory(base, vm_name, Local::now());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;
    debug!(path = %dir, "created run directory");
    Ok(dir)
}

/// Destination of the image exported for `volume`.
#[must_use]
pub fn image_path(dir: &Utf8Path, volume: &VolumeId, format: DiskFormat) -> Utf8PathBuf {
    dir.join(format!("{volume}.{format}"))
}

/// Writes the configuration, tags, and metadata documents into `dir`.
///
/// Missing tags or metadata are written as empty documents so every run
/// directory has the same shape.
///
/// # Errors
///
/// Returns [`ArtifactError`] for the first file that cannot be written.
pub async fn write_documents(dir: &Utf8Path, documents: &VmDocuments) -> Result<(), ArtifactError> {
    let tags = documents
        .tags
        .clone()
        .unwrap_or_else(|| json!({ "tags": [] }));
    let metadata = documents
        .metadata
        .clone()
        .unwrap_or_else(|| json!({ "metadata": {} }));
    write_json(&dir.join(CONFIG_FILE), &documents.config).await?;
    write_json(&dir.join(TAGS_FILE), &tags).await?;
    write_json(&dir.join(METADATA_FILE), &metadata).await
}

async fn write_json(path: &Utf8Path, value: &Value) -> Result<(), ArtifactError> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, body)
        .await
        .map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Removes a partial or empty download, logging instead of failing.
pub async fn discard(path: &Utf8Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(%path, "removed incomplete image"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(%path, error = %err, "failed to remove incomplete image"),
    }
}
