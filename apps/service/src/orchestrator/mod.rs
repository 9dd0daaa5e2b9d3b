/// Orchestrator module - wires the background loops to the store
///
/// The orchestrator:
/// - Prepares the database schema
/// - Starts the monitor loop and the guest retention sweeper
/// - Announces status transitions in the log
///
/// Both loops run until the process exits.

pub mod retention;


pub use retention::{RetentionPolicy, RetentionSweeper};

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::database::{LibsqlStore, TargetStore, initialize_database};
use crate::monitoring::checker::{HttpProbe, Probe};
use crate::monitoring::clock::{Clock, SystemClock};
use crate::monitoring::events::{StatusEvents, spawn_status_logger};
use crate::monitoring::MonitorLoop;
use crate::pool::LibsqlPool;

/// Main orchestrator for the sitewatch service
pub struct Orchestrator {
    config: Arc<Config>,
    store: Arc<dyn TargetStore>,
    probe: Arc<dyn Probe>,
    clock: Arc<dyn Clock>,
    events: StatusEvents,
}

impl Orchestrator {
    /// Create and run an orchestrator until Ctrl-C
    pub async fn start(config: Config, pool: LibsqlPool) -> Result<()> {
        let orchestrator = Self::new(config, pool).await?;
        orchestrator.run().await
    }

    /// Create a new orchestrator instance
    pub async fn new(config: Config, pool: LibsqlPool) -> Result<Self> {
        let conn = pool.get().await?;
        info!("Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        let probe = HttpProbe::new(
            config.monitor.probe_timeout(),
            config.monitor.expected_status_code,
        )?;

        Ok(Self::with_parts(
            config,
            Arc::new(LibsqlStore::new_from_pool(pool)),
            Arc::new(probe),
            Arc::new(SystemClock),
        ))
    }

    /// Build from explicit dependencies
    pub fn with_parts(
        config: Config,
        store: Arc<dyn TargetStore>,
        probe: Arc<dyn Probe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config: Arc::new(config), store, probe, clock, events: StatusEvents::new() }
    }

    pub fn events(&self) -> &StatusEvents {
        &self.events
    }

    /// Spawn the monitor loop, the retention sweeper and the status logger
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let monitor = MonitorLoop::new(
            self.store.clone(),
            self.probe.clone(),
            self.clock.clone(),
            self.events.clone(),
            &self.config.monitor,
        );

        let sweeper = RetentionSweeper::new(
            self.store.clone(),
            self.clock.clone(),
            RetentionPolicy::from(&self.config.retention),
        );

        vec![spawn_status_logger(&self.events), monitor.spawn(), sweeper.spawn()]
    }

    /// Run until Ctrl-C or until a background task dies
    pub async fn run(self) -> Result<()> {
        let handles = self.spawn_background_tasks();
        info!("Monitoring started, press Ctrl-C to stop");

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown requested");
            }
            (result, index, _) = futures::future::select_all(handles) => {
                // The loops never return, so this only fires on a panic
                error!(task = index, "Background task stopped unexpectedly: {result:?}");
            }
        }

        Ok(())
    }
}
