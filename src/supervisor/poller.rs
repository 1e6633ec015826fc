//! Periodic status refresh.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{RefreshOutcome, Supervisor};

/// Default time between status refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Background task refreshing entry statuses on a fixed interval.
///
/// The first refresh runs immediately. Ticks that find a pass already in
/// flight are dropped. Dropping the poller cancels it; use
/// [`Poller::shutdown`] to also wait for the task to exit.
#[derive(Debug)]
pub struct Poller {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn the poll loop for `supervisor`.
    #[must_use]
    pub fn start(supervisor: Supervisor, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!(?interval, "Status poller started");

            loop {
                tokio::select! {
                    biased;

                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Cancelling mid-pass drops the pass before it writes back.
                tokio::select! {
                    biased;

                    () = token.cancelled() => break,
                    outcome = supervisor.refresh_status() => {
                        if outcome == RefreshOutcome::Skipped {
                            tracing::trace!("Poll tick skipped");
                        }
                    }
                }
            }

            tracing::debug!("Status poller stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Whether the poll loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Get a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Status poller task failed");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
