//! In-process `TargetStore` used by unit tests of the background loops.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use super::models::{MonitoredTarget, Owner, UserProfile};
use super::repository::TargetStore;
use crate::monitoring::types::TargetStatus;

#[derive(Default)]
pub struct MemoryStore {
    targets: Mutex<Vec<MonitoredTarget>>,
    fail_reads: Mutex<bool>,
    fail_sweeps: Mutex<bool>,
    failing_updates: Mutex<HashSet<Uuid>>,
    update_calls: Mutex<Vec<Uuid>>,
    profiles: Mutex<Vec<UserProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: Vec<MonitoredTarget>) -> Self {
        let store = Self::new();
        *store.targets.lock().unwrap() = targets;
        store
    }

    pub fn snapshot(&self) -> Vec<MonitoredTarget> {
        self.targets.lock().unwrap().clone()
    }

    pub fn find(&self, id: Uuid) -> Option<MonitoredTarget> {
        self.snapshot().into_iter().find(|t| t.id == id)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    pub fn set_fail_sweeps(&self, fail: bool) {
        *self.fail_sweeps.lock().unwrap() = fail;
    }

    /// Make every status update for `id` fail
    pub fn fail_updates_for(&self, id: Uuid) {
        self.failing_updates.lock().unwrap().insert(id);
    }

    /// Target ids passed to `update_target_status`, in call order
    pub fn update_calls(&self) -> Vec<Uuid> {
        self.update_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_all_targets(&self) -> Result<Vec<MonitoredTarget>> {
        if *self.fail_reads.lock().unwrap() {
            return Err(anyhow!("store unavailable"));
        }
        Ok(self.snapshot())
    }

    async fn update_target_status(
        &self,
        id: Uuid,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.update_calls.lock().unwrap().push(id);
        if self.failing_updates.lock().unwrap().contains(&id) {
            return Err(anyhow!("write rejected for {id}"));
        }

        let mut targets = self.targets.lock().unwrap();
        let Some(target) = targets.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        if target.last_checked_at.is_some_and(|previous| previous > checked_at) {
            return Ok(false);
        }
        target.status = status;
        target.last_checked_at = Some(checked_at);
        Ok(true)
    }

    async fn delete_guest_targets_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        if *self.fail_sweeps.lock().unwrap() {
            return Err(anyhow!("store unavailable"));
        }

        let mut targets = self.targets.lock().unwrap();
        let before = targets.len();
        targets.retain(|t| !(t.owner.is_guest() && t.created_at < cutoff));
        Ok((before - targets.len()) as u64)
    }

    async fn add_target(&self, target: &MonitoredTarget) -> Result<()> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<MonitoredTarget>> {
        Ok(self.find(id))
    }

    async fn list_targets_for_owner(&self, owner: &Owner) -> Result<Vec<MonitoredTarget>> {
        Ok(self.snapshot().into_iter().filter(|t| &t.owner == owner).collect())
    }

    async fn delete_target(&self, id: Uuid, owner: &Owner) -> Result<bool> {
        let mut targets = self.targets.lock().unwrap();
        let before = targets.len();
        targets.retain(|t| !(t.id == id && &t.owner == owner));
        Ok(targets.len() < before)
    }

    async fn save_profile(
        &self,
        username: Option<&str>,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProfile> {
        let mut profiles = self.profiles.lock().unwrap();
        if let Some(profile) = profiles.iter_mut().find(|p| p.email == email) {
            profile.username = username.map(str::to_string);
            return Ok(profile.clone());
        }

        let profile = UserProfile {
            id: profiles.len() as i64 + 1,
            username: username.map(str::to_string),
            email: email.to_string(),
            created_at: now,
        };
        profiles.push(profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        Ok(self.profiles.lock().unwrap().iter().find(|p| p.id == user_id).cloned())
    }
}
