//! Background removal of expired job records.
//!
//! Reads already hide expired records; the sweeper reclaims their storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use vestige_core::{defaults, Error, JobStore, Result};

/// Retention sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(defaults::JOB_PURGE_INTERVAL_SECS),
        }
    }
}

impl SweeperConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_PURGE_INTERVAL_SECS` | `3600` | Seconds between sweeps |
    pub fn from_env() -> Self {
        let secs = std::env::var("JOB_PURGE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults::JOB_PURGE_INTERVAL_SECS);
        Self {
            interval: Duration::from_secs(secs),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Purge expired records once. Returns the number removed, or `None` if the
/// purge failed (logged).
pub async fn sweep_once(store: &dyn JobStore) -> Option<u64> {
    match store.purge_expired().await {
        Ok(0) => {
            debug!(
                subsystem = "jobs",
                component = "retention",
                op = "purge",
                "No expired jobs"
            );
            Some(0)
        }
        Ok(purged) => {
            info!(
                subsystem = "jobs",
                component = "retention",
                op = "purge",
                result_count = purged,
                "Expired jobs purged"
            );
            Some(purged)
        }
        Err(e) => {
            warn!(
                subsystem = "jobs",
                component = "retention",
                op = "purge",
                error = %e,
                "Purging expired jobs failed, records will be retried next sweep"
            );
            None
        }
    }
}

/// Handle for a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task already exited.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("retention sweeper panicked: {}", e)))
    }
}

/// Spawn a task sweeping `store` every `config.interval`, starting now.
pub fn spawn_retention_sweeper(store: Arc<dyn JobStore>, config: SweeperConfig) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        info!(
            subsystem = "jobs",
            component = "retention",
            interval_secs = config.interval.as_secs(),
            "Retention sweeper started"
        );
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "jobs", component = "retention", "Retention sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    sweep_once(store.as_ref()).await;
                }
            }
        }
    });

    SweeperHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_config_default() {
        assert_eq!(SweeperConfig::default().interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_sweeper_config_with_interval() {
        let config = SweeperConfig::default().with_interval(Duration::from_secs(5));
        assert_eq!(config.interval, Duration::from_secs(5));
    }
}
