//! Launching applications and confirming they came up.

use std::path::Path;
use std::time::Duration;

use super::{LaunchError, ProcessTable};

/// Default bound on waiting for a launched process to become queryable.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between start-time queries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for a launched process to be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Give up confirming after this long.
    pub confirm_timeout: Duration,
    /// Pause between start-time queries.
    pub retry_interval: Duration,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Launch `path` and wait until the OS reports a start time for it.
///
/// Right after a spawn the process may not be queryable yet, so the start
/// time is polled until it appears or `policy.confirm_timeout` elapses.
///
/// # Errors
///
/// Returns a `LaunchError` if the spawn fails or the start is not confirmed
/// in time.
pub async fn launch_and_confirm(
    table: &dyn ProcessTable,
    path: &Path,
    policy: &LaunchPolicy,
) -> Result<u32, LaunchError> {
    let pid = table.launch(path).await?;
    tracing::debug!(path = %path.display(), pid, "Launched, awaiting confirmation");

    let confirmation = tokio::time::timeout(policy.confirm_timeout, async {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            if let Some(started) = table.start_time(pid).await {
                return (started, attempts);
            }
            tokio::time::sleep(policy.retry_interval).await;
        }
    })
    .await;

    match confirmation {
        Ok((started, attempts)) => {
            tracing::info!(
                path = %path.display(),
                pid,
                started,
                attempts,
                "Application started"
            );
            Ok(pid)
        }
        Err(_) => Err(LaunchError::Unconfirmed {
            path: path.to_path_buf(),
            pid,
            timeout: policy.confirm_timeout,
        }),
    }
}
