//! Best-effort release of temporary resources.
//!
//! Deletion never fails the caller: errors and grace-period expiry are logged
//! as warnings and the resource is left for an operator to remove.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::resource::TemporaryResource;

/// Default time allowed for a single deletion request.
pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_secs(120);

/// Outcome of one deletion attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Release {
    /// The provider accepted the deletion.
    Deleted,
    /// The provider rejected the deletion.
    Failed,
    /// The deletion did not finish within the grace period.
    TimedOut,
}

/// Deletes `resource`, waiting at most `grace`. Does not observe run
/// cancellation.
pub async fn release<B>(backend: &B, resource: &TemporaryResource, grace: Duration) -> Release
where
    B: StorageBackend + ?Sized,
{
    let TemporaryResource { kind, id, volume } = resource;
    match timeout(grace, backend.delete(*kind, id)).await {
        Ok(Ok(())) => {
            info!(%kind, %id, %volume, "released temporary {kind}");
            Release::Deleted
        }
        Ok(Err(err)) => {
            warn!(%kind, %id, %volume, error = %err, "failed to release temporary {kind}; remove it manually");
            Release::Failed
        }
        Err(_) => {
            warn!(
                %kind,
                %id,
                %volume,
                grace_secs = grace.as_secs(),
                "timed out releasing temporary {kind}; remove it manually"
            );
            Release::TimedOut
        }
    }
}

/// Resources created by one pipeline, released newest first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReleaseStack {
    resources: Vec<TemporaryResource>,
}

impl ReleaseStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// Records a resource that was created successfully.
    pub fn push(&mut self, resource: TemporaryResource) {
        self.resources.push(resource);
    }

    /// Number of recorded resources.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` when nothing was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Recorded resources in creation order.
    #[must_use]
    pub fn resources(&self) -> &[TemporaryResource] {
        &self.resources
    }

    /// Releases every recorded resource in reverse creation order, once each.
    pub async fn release_all<B>(self, backend: &B, grace: Duration) -> Vec<Release>
    where
        B: StorageBackend + ?Sized,
    {
        let mut outcomes = Vec::with_capacity(self.resources.len());
        for resource in self.resources.iter().rev() {
            outcomes.push(release(backend, resource, grace).await);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests;
