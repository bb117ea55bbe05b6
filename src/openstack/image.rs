//! Glance status and download calls.

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::backend::ImageSink;
use crate::resource::ResourceId;

use super::OpenStackBackend;
use super::error::OpenStackError;
use super::types::StatusObject;

impl OpenStackBackend {
    pub(super) async fn image_status(&self, url: &str) -> Result<String, OpenStackError> {
        let image: StatusObject = self.api.get_json(url, &[]).await?;
        Ok(image.status)
    }

    pub(super) async fn stream_image(
        &self,
        image_id: &ResourceId,
        sink: ImageSink<'_>,
    ) -> Result<u64, OpenStackError> {
        let url = format!("{}/images/{image_id}/file", self.endpoints.image);
        let mut response = self.api.get_stream(&url).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| OpenStackError::Transport {
                method: "GET".to_owned(),
                url: url.clone(),
                source,
            })?
        {
            sink.write_all(&chunk)
                .await
                .map_err(|source| io_error(image_id, source))?;
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }
        sink.flush()
            .await
            .map_err(|source| io_error(image_id, source))?;
        debug!(image = %image_id, bytes = written, "image downloaded");
        Ok(written)
    }
}

fn io_error(image_id: &ResourceId, source: std::io::Error) -> OpenStackError {
    OpenStackError::Io {
        image_id: image_id.to_string(),
        source,
    }
}
