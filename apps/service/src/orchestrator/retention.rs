//! Expiry of guest-owned targets.
//!
//! Guest sessions are anonymous, so anything they register is deleted once
//! it is older than the retention window (24 hours by default). Targets
//! owned by registered users are never aged out. The sweep runs every hour
//! as a background task.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::database::TargetStore;
use crate::monitoring::clock::Clock;

/// Retention window and sweep period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// How long a guest target survives after creation
    pub guest_retention: Duration,
    /// Pause between sweeps
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            guest_retention: config.guest_retention(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

impl RetentionPolicy {
    /// Guest targets created before this instant are expired
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.guest_retention).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Periodic bulk delete of expired guest targets
pub struct RetentionSweeper {
    store: Arc<dyn TargetStore>,
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn TargetStore>, clock: Arc<dyn Clock>, policy: RetentionPolicy) -> Self {
        Self { store, clock, policy }
    }

    /// Delete every guest target older than the retention window.
    /// Returns the number of targets removed.
    pub async fn sweep(&self) -> Result<u64> {
        let cutoff = self.policy.cutoff(self.clock.now());
        debug!(%cutoff, "Sweeping expired guest targets");

        let deleted = self.store.delete_guest_targets_before(cutoff).await?;

        if deleted > 0 {
            info!(deleted, %cutoff, "Removed expired guest targets");
        } else {
            debug!("No expired guest targets");
        }

        Ok(deleted)
    }

    /// Start the background sweep task. It runs until the process exits.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            retention_hours = self.policy.guest_retention.as_secs() / 3600,
            interval_secs = self.policy.sweep_interval.as_secs(),
            "Retention sweeper started"
        );

        loop {
            if let Err(e) = self.sweep().await {
                warn!("Guest retention sweep failed, retrying next period: {e:#}");
            }

            self.clock.sleep(self.policy.sweep_interval).await;
        }
    }
}
