//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::LaunchPolicy;
use crate::registry::DEFAULT_REGISTRY_FILE;

/// Shortest poll interval accepted; a zero interval would spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Status polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between status refreshes.
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

/// Launch confirmation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Give up confirming a launch after this many milliseconds.
    pub confirm_timeout_ms: u64,
    /// Milliseconds between start-time queries.
    pub retry_interval_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 5000,
            retry_interval_ms: 50,
        }
    }
}

/// Restart configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Pause between the stop and start passes, in milliseconds.
    pub settle_ms: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self { settle_ms: 500 }
    }
}

/// Settings for the application starter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarterConfig {
    /// Where the application list is stored.
    pub registry_path: Option<PathBuf>,
    pub poll: PollConfig,
    pub launch: LaunchConfig,
    pub restart: RestartConfig,
}

impl StarterConfig {
    /// Configured registry path, or the default location.
    ///
    /// The default is `<data dir>/app-starter/applications.toml`, falling
    /// back to the current directory when there is no data directory.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.registry_path.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(
                || PathBuf::from(DEFAULT_REGISTRY_FILE),
                |dir| dir.join("app-starter").join(DEFAULT_REGISTRY_FILE),
            )
        })
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs).max(MIN_POLL_INTERVAL)
    }

    #[must_use]
    pub fn launch_policy(&self) -> LaunchPolicy {
        LaunchPolicy {
            confirm_timeout: Duration::from_millis(self.launch.confirm_timeout_ms),
            retry_interval: Duration::from_millis(self.launch.retry_interval_ms),
        }
    }

    #[must_use]
    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart.settle_ms)
    }
}
