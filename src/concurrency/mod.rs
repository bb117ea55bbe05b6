//! Bounded fan-out shared by the VM and volume levels of a run.
//!
//! Every item runs in its own task on a [`JoinSet`]. An optional
//! [`Semaphore`] caps how many run at once, and each task reports into the
//! slot matching its input index, so one failing or panicking task never
//! hides the outcome of its siblings.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Why a fan-out slot holds no output.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TaskFailure {
    /// The task panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The run was cancelled before the task obtained a permit.
    #[error("cancelled before start")]
    Cancelled,
    /// The task ended without reporting a result.
    #[error("task ended without a result")]
    Lost,
}

/// Builds the gate for `limit` concurrent tasks; `0` means unbounded.
#[must_use]
pub fn build_semaphore(limit: usize) -> Option<Arc<Semaphore>> {
    match limit {
        0 => None,
        n => Some(Arc::new(Semaphore::new(n))),
    }
}

/// Runs `work` for every item with at most `limit` in flight (`0` means no
/// limit) and returns one slot per item, in input order.
///
/// All tasks are joined before returning; there is no early abort. Waiting
/// for a permit observes `cancel`.
pub async fn bounded_fan_out<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    cancel: &CancellationToken,
    work: F,
) -> Vec<Result<T, TaskFailure>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = build_semaphore(limit);
    let mut set = JoinSet::new();
    let total = items.len();

    for (index, item) in items.into_iter().enumerate() {
        let gate = semaphore.clone();
        let token = cancel.clone();
        let task = work(item);
        set.spawn(async move {
            let _permit = match gate {
                Some(sem) => tokio::select! {
                    biased;
                    () = token.cancelled() => return (index, Err(TaskFailure::Cancelled)),
                    permit = sem.acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => return (index, Err(TaskFailure::Cancelled)),
                    },
                },
                None => None,
            };
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|payload| TaskFailure::Panicked(panic_message(payload.as_ref())));
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<Result<T, TaskFailure>>> = std::iter::repeat_with(|| None)
        .take(total)
        .collect();
    while let Some(joined) = set.join_next().await {
        if let Ok((index, outcome)) = joined
            && let Some(slot) = slots.get_mut(index)
        {
            *slot = Some(outcome);
        }
    }
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(TaskFailure::Lost)))
        .collect()
}

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic payload"))
}

#[cfg(test)]
mod tests;
