//! Polling wait for asynchronous resource state transitions.
//!
//! The provider offers no completion callback, so each create step is
//! followed by a time-driven poll of the resource's status field.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::resource::{ResourceId, ResourceKind};

/// Default upper bound on a single wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Default pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Approximate spacing of progress log lines.
const PROGRESS_CADENCE: Duration = Duration::from_secs(30);

/// Timeout and interval applied to one wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    timeout: Duration,
    poll_interval: Duration,
    progress_every: u32,
}

impl WaitPolicy {
    /// Builds a policy; progress is reported roughly every 30 seconds.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        let interval_ms = poll_interval.as_millis().max(1);
        let polls = PROGRESS_CADENCE.as_millis().div_ceil(interval_ms);
        Self {
            timeout,
            poll_interval,
            progress_every: u32::try_from(polls).unwrap_or(u32::MAX).max(1),
        }
    }

    /// Maximum time spent waiting.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Number of polls between progress log lines.
    #[must_use]
    pub const fn progress_every(&self) -> u32 {
        self.progress_every
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Errors raised while waiting for a resource.
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the status lookup itself fails.
    #[error("failed to fetch status of {kind} {id}: {source}")]
    Fetch {
        /// Kind of resource being polled.
        kind: ResourceKind,
        /// Resource identifier.
        id: ResourceId,
        /// Backend error.
        #[source]
        source: E,
    },
    /// Raised when the target status is not reached before the deadline.
    #[error("timeout after {}s waiting for {kind} {id} (last status: {last_status})", .waited.as_secs())]
    Timeout {
        /// Kind of resource being polled.
        kind: ResourceKind,
        /// Resource identifier.
        id: ResourceId,
        /// Status observed on the final poll.
        last_status: String,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Raised when the provider reports a terminal failure status.
    #[error("{kind} {id} entered {status} state")]
    EnteredErrorState {
        /// Kind of resource being polled.
        kind: ResourceKind,
        /// Resource identifier.
        id: ResourceId,
        /// Terminal status reported by the provider.
        status: String,
    },
    /// Raised when the surrounding run is cancelled mid-wait.
    #[error("wait for {kind} {id} cancelled")]
    Cancelled {
        /// Kind of resource being polled.
        kind: ResourceKind,
        /// Resource identifier.
        id: ResourceId,
    },
}

/// Polls `id` until it reports `target`.
///
/// # Errors
///
/// Returns [`WaitError::EnteredErrorState`] as soon as a terminal status is
/// seen, [`WaitError::Timeout`] once the policy's timeout has elapsed,
/// [`WaitError::Fetch`] on the first failed lookup, and
/// [`WaitError::Cancelled`] when `cancel` fires.
pub async fn wait_for_status<B>(
    backend: &B,
    kind: ResourceKind,
    id: &ResourceId,
    target: &str,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<(), WaitError<B::Error>>
where
    B: StorageBackend + ?Sized,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut until_progress = policy.progress_every;

    loop {
        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(WaitError::Cancelled { kind, id: id.clone() });
            }
            fetched = backend.status(kind, id) => fetched.map_err(|source| WaitError::Fetch {
                kind,
                id: id.clone(),
                source,
            })?,
        };

        if status.eq_ignore_ascii_case(target) {
            debug!(%kind, %id, %status, "resource reached target status");
            return Ok(());
        }
        if kind.is_failure_status(&status) {
            return Err(WaitError::EnteredErrorState {
                kind,
                id: id.clone(),
                status,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                kind,
                id: id.clone(),
                last_status: status,
                waited: now.duration_since(started),
            });
        }

        until_progress = until_progress.saturating_sub(1);
        if until_progress == 0 {
            until_progress = policy.progress_every;
            info!(
                %kind,
                %id,
                %status,
                elapsed_secs = now.duration_since(started).as_secs(),
                "still waiting for {target}"
            );
        }

        let pause = policy.poll_interval.min(deadline.duration_since(now));
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(WaitError::Cancelled { kind, id: id.clone() });
            }
            () = sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests;
