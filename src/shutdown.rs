//! Termination signal handling for backup runs.
//!
//! A signal cancels the run token. In-flight pipelines stop waiting, then
//! release their temporary resources within the cleanup grace period before
//! the process exits.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Waits for a termination signal.
///
/// Listens for `SIGINT`, `SIGTERM`, and `SIGQUIT`.
///
/// # Errors
///
/// Returns an error when signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for Ctrl-C.
///
/// # Errors
///
/// Returns an error when signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Spawns a task that cancels `token` on the first termination signal.
///
/// The task ends quietly when `token` is cancelled by someone else.
#[must_use = "await or abort the watcher once the run finishes"]
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            received = wait_for_shutdown_signal() => match received {
                Ok(()) => {
                    warn!("shutdown requested; cancelling backup run and releasing resources");
                    token.cancel();
                }
                Err(err) => error!(error = %err, "failed to install signal handlers"),
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watcher_exits_when_the_run_finishes() {
        let token = CancellationToken::new();
        let watcher = cancel_on_signal(token.clone());

        token.cancel();

        watcher
            .await
            .unwrap_or_else(|err| panic!("watcher task failed: {err}"));
    }
}
