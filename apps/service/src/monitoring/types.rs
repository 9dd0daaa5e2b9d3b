use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Recorded status of a monitored target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetStatus::Unknown => write!(f, "unknown"),
            TargetStatus::Up => write!(f, "up"),
            TargetStatus::Down => write!(f, "down"),
        }
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(TargetStatus::Unknown),
            "up" => Ok(TargetStatus::Up),
            "down" => Ok(TargetStatus::Down),
            other => Err(other.to_string()),
        }
    }
}

/// Binary classification produced by a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Up,
    Down,
}

impl From<Health> for TargetStatus {
    fn from(health: Health) -> Self {
        match health {
            Health::Up => TargetStatus::Up,
            Health::Down => TargetStatus::Down,
        }
    }
}

/// Outcome of one probe against a URL.
///
/// Only `health` drives state; the remaining fields exist for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub health: Health,

    /// HTTP status code, when a response was received
    pub status_code: Option<u16>,

    /// Time until the response headers arrived
    pub latency_ms: Option<u64>,

    /// Why the probe was classified as down
    pub reason: Option<String>,
}

impl ProbeOutcome {
    /// Response matched the expected status code
    pub fn up(status_code: u16, latency_ms: u64) -> Self {
        Self {
            health: Health::Up,
            status_code: Some(status_code),
            latency_ms: Some(latency_ms),
            reason: None,
        }
    }

    /// Response arrived but carried the wrong status code
    pub fn unexpected_status(status_code: u16, expected: u16, latency_ms: u64) -> Self {
        Self {
            health: Health::Down,
            status_code: Some(status_code),
            latency_ms: Some(latency_ms),
            reason: Some(format!("expected HTTP {expected}, got {status_code}")),
        }
    }

    /// No usable response at all (DNS, refused, timeout, TLS, bad URL)
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            health: Health::Down,
            status_code: None,
            latency_ms: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_up(&self) -> bool {
        self.health == Health::Up
    }
}

/// A recorded status transition, emitted by the monitor loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub target_id: Uuid,
    pub url: String,
    pub previous: TargetStatus,
    pub current: TargetStatus,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_round_trip() {
        for status in [TargetStatus::Unknown, TargetStatus::Up, TargetStatus::Down] {
            assert_eq!(status.to_string().parse::<TargetStatus>(), Ok(status));
        }
        assert!("degraded".parse::<TargetStatus>().is_err());
    }

    #[test]
    fn test_default_status_is_unknown() {
        assert_eq!(TargetStatus::default(), TargetStatus::Unknown);
    }

    #[test]
    fn test_outcome_constructors() {
        let up = ProbeOutcome::up(200, 12);
        assert!(up.is_up());
        assert_eq!(up.reason, None);

        let wrong = ProbeOutcome::unexpected_status(500, 200, 3);
        assert_eq!(wrong.health, Health::Down);
        assert_eq!(wrong.status_code, Some(500));
        assert!(wrong.reason.unwrap().contains("500"));

        let gone = ProbeOutcome::unreachable("connection refused");
        assert_eq!(TargetStatus::from(gone.health), TargetStatus::Down);
        assert_eq!(gone.status_code, None);
    }
}
