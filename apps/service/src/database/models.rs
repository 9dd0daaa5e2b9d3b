use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::monitoring::types::TargetStatus;

/// Errors raised while turning stored rows back into models
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("target {0} has both a user and a guest session as owner")]
    AmbiguousOwner(String),

    #[error("target {0} has no owner")]
    MissingOwner(String),

    #[error("unrecognised status value: {0}")]
    InvalidStatus(String),

    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("malformed target id: {0}")]
    InvalidId(#[from] uuid::Error),
}

/// Who a target belongs to.
///
/// A registered user's targets live until removed. Guest targets are
/// scoped to an anonymous session and expire after the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    User(i64),
    Guest(String),
}

impl Owner {
    pub fn is_guest(&self) -> bool {
        matches!(self, Owner::Guest(_))
    }

    /// Split into the `(user_id, session_id)` column pair
    pub fn to_columns(&self) -> (Option<i64>, Option<String>) {
        match self {
            Owner::User(id) => (Some(*id), None),
            Owner::Guest(session) => (None, Some(session.clone())),
        }
    }

    /// Rebuild from the `(user_id, session_id)` column pair.
    /// `target` only labels the error.
    pub fn from_columns(
        target: &str,
        user_id: Option<i64>,
        session_id: Option<String>,
    ) -> Result<Self, ModelError> {
        match (user_id, session_id) {
            (Some(id), None) => Ok(Owner::User(id)),
            (None, Some(session)) => Ok(Owner::Guest(session)),
            (Some(_), Some(_)) => Err(ModelError::AmbiguousOwner(target.to_string())),
            (None, None) => Err(ModelError::MissingOwner(target.to_string())),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user:{id}"),
            Owner::Guest(session) => write!(f, "guest:{session}"),
        }
    }
}

/// A URL watched by the monitor loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: Uuid,
    pub url: String,
    pub owner: Owner,
    pub status: TargetStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MonitoredTarget {
    /// Create a new, never-checked target
    pub fn new(url: impl Into<String>, owner: Owner, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            owner,
            status: TargetStatus::Unknown,
            last_checked_at: None,
            created_at,
        }
    }

    /// Convert a timestamp to Unix milliseconds for storage
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Convert stored Unix milliseconds back to a timestamp
    pub fn i64_to_timestamp(millis: i64) -> Result<DateTime<Utc>, ModelError> {
        DateTime::from_timestamp_millis(millis).ok_or(ModelError::InvalidTimestamp(millis))
    }
}

/// A registered user. Targets owned by `Owner::User(id)` point at `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Name shown for an anonymous session
    pub fn guest_display_name(session_id: &str) -> String {
        let prefix: String = session_id.chars().take(6).collect();
        format!("Guest-{prefix}")
    }
}
