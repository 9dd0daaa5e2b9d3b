use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::warn;
use uuid::Uuid;

use super::models::{ModelError, MonitoredTarget, Owner, UserProfile};
use crate::monitoring::types::TargetStatus;
use crate::pool::LibsqlPool;

/// Persistence interface shared by the background loops and the
/// registration commands
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Every registered target, in insertion order.
    ///
    /// Rows that cannot be decoded are logged and left out.
    async fn list_all_targets(&self) -> Result<Vec<MonitoredTarget>>;

    /// Commit a probe result for one target.
    ///
    /// A result older than the stored `last_checked_at` is discarded.
    /// Returns `false` when nothing was written, either because the target
    /// no longer exists or because it already holds a newer result.
    async fn update_target_status(
        &self,
        id: Uuid,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete guest-owned targets created strictly before `cutoff`
    async fn delete_guest_targets_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Register a new target
    async fn add_target(&self, target: &MonitoredTarget) -> Result<()>;

    /// Get a target by id
    async fn get_target(&self, id: Uuid) -> Result<Option<MonitoredTarget>>;

    /// Targets belonging to one owner, in insertion order
    async fn list_targets_for_owner(&self, owner: &Owner) -> Result<Vec<MonitoredTarget>>;

    /// Delete a target if `owner` owns it. Returns whether a row was removed.
    async fn delete_target(&self, id: Uuid, owner: &Owner) -> Result<bool>;

    /// Create or update the profile registered under `email`.
    /// An existing profile keeps its id and creation time.
    async fn save_profile(
        &self,
        username: Option<&str>,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProfile>;

    /// Get a registered user's profile
    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>>;
}

const TARGET_COLUMNS: &str = "id, url, user_id, session_id, status, last_checked_at, created_at";
const USER_COLUMNS: &str = "id, username, email, created_at";

/// LibSQL-backed target store
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_targets(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<MonitoredTarget>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut targets = Vec::new();

        while let Some(row) = rows.next().await? {
            targets.push(target_from_row(&row)?);
        }

        Ok(targets)
    }
}

fn target_from_row(row: &libsql::Row) -> Result<MonitoredTarget> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    let last_checked_at: Option<i64> = row.get(5)?;
    let created_at: i64 = row.get(6)?;

    Ok(MonitoredTarget {
        owner: Owner::from_columns(&id, row.get(2)?, row.get(3)?)?,
        id: Uuid::parse_str(&id)?,
        url: row.get(1)?,
        status: status.parse::<TargetStatus>().map_err(ModelError::InvalidStatus)?,
        last_checked_at: last_checked_at.map(MonitoredTarget::i64_to_timestamp).transpose()?,
        created_at: MonitoredTarget::i64_to_timestamp(created_at)?,
    })
}

fn profile_from_row(row: &libsql::Row) -> Result<UserProfile> {
    let created_at: i64 = row.get(3)?;

    Ok(UserProfile {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: MonitoredTarget::i64_to_timestamp(created_at)?,
    })
}

#[async_trait]
impl TargetStore for LibsqlStore {
    async fn list_all_targets(&self) -> Result<Vec<MonitoredTarget>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY created_at ASC, rowid ASC"),
                (),
            )
            .await?;
        let mut targets = Vec::new();

        while let Some(row) = rows.next().await? {
            match target_from_row(&row) {
                Ok(target) => targets.push(target),
                Err(e) => {
                    let raw_id = row.get::<String>(0).unwrap_or_default();
                    warn!(target_id = %raw_id, "Skipping unreadable target row: {e:#}");
                }
            }
        }

        Ok(targets)
    }

    async fn update_target_status(
        &self,
        id: Uuid,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.get_conn().await?;
        let checked_at = MonitoredTarget::timestamp_to_i64(checked_at);

        let changed = conn
            .execute(
                "UPDATE targets SET status = ?1, last_checked_at = ?2
                 WHERE id = ?3 AND (last_checked_at IS NULL OR last_checked_at <= ?2)",
                params![status.to_string(), checked_at, id.to_string()],
            )
            .await?;

        Ok(changed > 0)
    }

    async fn delete_guest_targets_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;

        let deleted = conn
            .execute(
                "DELETE FROM targets WHERE session_id IS NOT NULL AND created_at < ?",
                params![MonitoredTarget::timestamp_to_i64(cutoff)],
            )
            .await?;

        Ok(deleted)
    }

    async fn add_target(&self, target: &MonitoredTarget) -> Result<()> {
        let conn = self.get_conn().await?;
        let (user_id, session_id) = target.owner.to_columns();

        conn.execute(
            "INSERT INTO targets (id, url, user_id, session_id, status, last_checked_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                target.id.to_string(),
                target.url.clone(),
                user_id,
                session_id,
                target.status.to_string(),
                target.last_checked_at.map(MonitoredTarget::timestamp_to_i64),
                MonitoredTarget::timestamp_to_i64(target.created_at)
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<MonitoredTarget>> {
        let mut targets = self
            .query_targets(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;

        Ok(targets.pop())
    }

    async fn list_targets_for_owner(&self, owner: &Owner) -> Result<Vec<MonitoredTarget>> {
        match owner {
            Owner::User(user_id) => {
                self.query_targets(
                    &format!(
                        "SELECT {TARGET_COLUMNS} FROM targets WHERE user_id = ? ORDER BY created_at ASC, rowid ASC"
                    ),
                    params![*user_id],
                )
                .await
            }
            Owner::Guest(session_id) => {
                self.query_targets(
                    &format!(
                        "SELECT {TARGET_COLUMNS} FROM targets WHERE session_id = ? ORDER BY created_at ASC, rowid ASC"
                    ),
                    params![session_id.clone()],
                )
                .await
            }
        }
    }

    async fn delete_target(&self, id: Uuid, owner: &Owner) -> Result<bool> {
        let conn = self.get_conn().await?;

        let deleted = match owner {
            Owner::User(user_id) => {
                conn.execute(
                    "DELETE FROM targets WHERE id = ? AND user_id = ?",
                    params![id.to_string(), *user_id],
                )
                .await?
            }
            Owner::Guest(session_id) => {
                conn.execute(
                    "DELETE FROM targets WHERE id = ? AND session_id = ?",
                    params![id.to_string(), session_id.clone()],
                )
                .await?
            }
        };

        Ok(deleted > 0)
    }

    async fn save_profile(
        &self,
        username: Option<&str>,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProfile> {
        let conn = self.get_conn().await?;

        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO users (username, email, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(email) DO UPDATE SET username = excluded.username
                     RETURNING {USER_COLUMNS}"
                ),
                params![username, email, MonitoredTarget::timestamp_to_i64(now)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => profile_from_row(&row),
            None => Err(anyhow::anyhow!("profile for {email} was not returned after saving")),
        }
    }

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"), params![user_id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(profile_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
