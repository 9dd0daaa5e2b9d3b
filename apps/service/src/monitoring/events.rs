use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::types::{StatusChange, TargetStatus};

const CHANNEL_CAPACITY: usize = 64;

/// Broadcast handle for status transitions.
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct StatusEvents {
    tx: broadcast::Sender<StatusChange>,
}

impl Default for StatusEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.tx.subscribe()
    }

    pub fn publish(&self, change: StatusChange) {
        debug!(target_id = %change.target_id, receivers = self.tx.receiver_count(), "Publishing status change");
        // No receivers is fine
        let _ = self.tx.send(change);
    }
}

/// Log every transition seen on `events` until the channel closes
pub fn spawn_status_logger(events: &StatusEvents) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => announce(&change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status logger fell behind, some transitions were not announced");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn announce(change: &StatusChange) {
    match change.current {
        TargetStatus::Up => info!(
            target_id = %change.target_id,
            previous = %change.previous,
            "{} is UP",
            change.url
        ),
        TargetStatus::Down => warn!(
            target_id = %change.target_id,
            previous = %change.previous,
            "{} is DOWN",
            change.url
        ),
        TargetStatus::Unknown => {}
    }
}
