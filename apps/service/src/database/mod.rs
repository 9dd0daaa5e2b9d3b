/// Database abstraction layer
///
/// This module provides the target store used by the monitor loop, the
/// retention sweeper and the registration commands.

pub mod migrations;
pub mod models;
pub mod repository;

#[cfg(test)]
pub mod memory;

pub use models::{MonitoredTarget, Owner, UserProfile};
pub use repository::{LibsqlStore, TargetStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
