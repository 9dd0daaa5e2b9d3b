use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::checker::Probe;
use super::clock::Clock;
use super::events::StatusEvents;
use super::types::{StatusChange, TargetStatus};
use crate::config::MonitorConfig;
use crate::database::{MonitoredTarget, TargetStore};

/// Tally of one pass over the target set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Targets probed this cycle
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    /// Targets whose recorded status changed
    pub changed: usize,
    /// Targets whose result could not be written
    pub write_failures: usize,
    /// Time spent in inter-target delays
    pub staggered: Duration,
    /// The target list could not be read, nothing was probed
    pub skipped: bool,
}

/// Time left to sleep after a cycle, never negative
pub fn remaining_cycle_time(interval: Duration, staggered: Duration) -> Duration {
    interval.saturating_sub(staggered)
}

/// Background loop that probes every registered target in turn.
///
/// Targets are visited sequentially in store order, with a fixed delay
/// after each one. Each result is committed before the next probe starts.
pub struct MonitorLoop {
    store: Arc<dyn TargetStore>,
    probe: Arc<dyn Probe>,
    clock: Arc<dyn Clock>,
    events: StatusEvents,
    check_interval: Duration,
    inter_target_delay: Duration,
}

impl MonitorLoop {
    pub fn new(
        store: Arc<dyn TargetStore>,
        probe: Arc<dyn Probe>,
        clock: Arc<dyn Clock>,
        events: StatusEvents,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            store,
            probe,
            clock,
            events,
            check_interval: config.check_interval(),
            inter_target_delay: config.inter_target_delay(),
        }
    }

    /// Start the loop on the runtime. It runs until the process exits.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            delay_secs = self.inter_target_delay.as_secs(),
            "Monitor loop started"
        );

        loop {
            let report = self.run_cycle().await;
            let rest = remaining_cycle_time(self.check_interval, report.staggered);

            if !report.skipped {
                info!(
                    checked = report.checked,
                    up = report.up,
                    down = report.down,
                    changed = report.changed,
                    write_failures = report.write_failures,
                    "Monitor cycle complete"
                );
            }
            if rest.is_zero() && report.checked > 0 {
                debug!(
                    staggered_secs = report.staggered.as_secs(),
                    "Stagger time exceeds the check interval, starting next cycle immediately"
                );
            }

            self.clock.sleep(rest).await;
        }
    }

    /// Visit every target once
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let targets = match self.store.list_all_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to load targets, skipping cycle: {e:#}");
                report.skipped = true;
                return report;
            }
        };

        debug!(count = targets.len(), "Starting monitor cycle");

        for target in &targets {
            self.check_target(target, &mut report).await;

            if !self.inter_target_delay.is_zero() {
                self.clock.sleep(self.inter_target_delay).await;
                report.staggered += self.inter_target_delay;
            }
        }

        report
    }

    async fn check_target(&self, target: &MonitoredTarget, report: &mut CycleReport) {
        let outcome = self.probe.probe(&target.url).await;
        let status = TargetStatus::from(outcome.health);
        let checked_at = self.clock.now();

        report.checked += 1;
        if outcome.is_up() {
            report.up += 1;
        } else {
            report.down += 1;
        }

        debug!(
            target_id = %target.id,
            url = %target.url,
            %status,
            status_code = ?outcome.status_code,
            latency_ms = ?outcome.latency_ms,
            reason = ?outcome.reason,
            "Probe finished"
        );

        match self.store.update_target_status(target.id, status, checked_at).await {
            Ok(true) if status != target.status => {
                report.changed += 1;
                info!(
                    target_id = %target.id,
                    url = %target.url,
                    previous = %target.status,
                    current = %status,
                    "Target changed status"
                );
                self.events.publish(StatusChange {
                    target_id: target.id,
                    url: target.url.clone(),
                    previous: target.status,
                    current: status,
                    at: checked_at,
                });
            }
            Ok(true) => {}
            Ok(false) => {
                debug!(target_id = %target.id, "Result not recorded, target removed or already newer");
            }
            Err(e) => {
                report.write_failures += 1;
                warn!(target_id = %target.id, url = %target.url, "Failed to record probe result: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Owner;
    use crate::database::memory::MemoryStore;
    use crate::monitoring::clock::ManualClock;
    use crate::monitoring::types::ProbeOutcome;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Probe with canned answers; unknown URLs time out
    struct ScriptedProbe {
        answers: Mutex<HashMap<String, ProbeOutcome>>,
        calls: Mutex<Vec<String>>,
        clock: ManualClock,
        latency: Duration,
    }

    impl ScriptedProbe {
        fn new(clock: &ManualClock) -> Self {
            Self {
                answers: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                clock: clock.clone(),
                latency: Duration::ZERO,
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn answer(&self, url: &str, outcome: ProbeOutcome) {
            self.answers.lock().unwrap().insert(url.to_string(), outcome);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            self.calls.lock().unwrap().push(url.to_string());
            self.clock.advance(self.latency);
            self.answers
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| ProbeOutcome::unreachable("request timed out"))
        }
    }

    fn start_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn config(interval: u64, delay: u64) -> MonitorConfig {
        MonitorConfig {
            check_interval_seconds: interval,
            inter_target_delay_seconds: delay,
            ..MonitorConfig::default()
        }
    }

    fn target(url: &str) -> MonitoredTarget {
        MonitoredTarget::new(url, Owner::User(1), start_time())
    }

    fn monitor(
        store: &Arc<MemoryStore>,
        probe: &Arc<ScriptedProbe>,
        clock: &ManualClock,
        events: &StatusEvents,
        config: &MonitorConfig,
    ) -> MonitorLoop {
        MonitorLoop::new(
            store.clone(),
            probe.clone(),
            Arc::new(clock.clone()),
            events.clone(),
            config,
        )
    }

    #[tokio::test]
    async fn test_first_cycle_classifies_every_target() {
        let clock = ManualClock::new(start_time());
        let a = target("https://a.example");
        let b = target("https://b.example");
        let store = Arc::new(MemoryStore::with_targets(vec![a.clone(), b.clone()]));
        let probe = Arc::new(ScriptedProbe::new(&clock));
        probe.answer(&a.url, ProbeOutcome::up(200, 5));

        let report = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5))
            .run_cycle()
            .await;

        let a = store.find(a.id).unwrap();
        let b = store.find(b.id).unwrap();
        assert_eq!(a.status, TargetStatus::Up);
        assert_eq!(b.status, TargetStatus::Down);
        assert!(a.last_checked_at.is_some());
        assert!(b.last_checked_at.is_some());
        assert!(a.last_checked_at < b.last_checked_at);
        assert_eq!(report.checked, 2);
        assert_eq!((report.up, report.down, report.changed), (1, 1, 2));
        assert_eq!(probe.calls(), vec!["https://a.example", "https://b.example"]);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_the_cycle() {
        let clock = ManualClock::new(start_time());
        let a = target("https://a.example");
        let b = target("https://b.example");
        let c = target("https://c.example");
        let store = Arc::new(MemoryStore::with_targets(vec![a.clone(), b.clone(), c.clone()]));
        store.fail_updates_for(b.id);
        let probe = Arc::new(ScriptedProbe::new(&clock));
        for t in [&a, &b, &c] {
            probe.answer(&t.url, ProbeOutcome::up(200, 1));
        }

        let events = StatusEvents::new();
        let mut rx = events.subscribe();

        let report = monitor(&store, &probe, &clock, &events, &config(60, 5)).run_cycle().await;

        assert_eq!(report.write_failures, 1);
        assert_eq!(report.checked, 3);
        assert_eq!(store.find(a.id).unwrap().status, TargetStatus::Up);
        assert_eq!(store.find(b.id).unwrap().status, TargetStatus::Unknown);
        assert_eq!(store.find(b.id).unwrap().last_checked_at, None);
        assert_eq!(store.find(c.id).unwrap().status, TargetStatus::Up);
        assert_eq!(store.update_calls(), vec![a.id, b.id, c.id]);

        assert_eq!(report.changed, 2);
        assert_eq!(rx.try_recv().unwrap().target_id, a.id);
        assert_eq!(rx.try_recv().unwrap().target_id, c.id);
        assert!(rx.try_recv().is_err(), "the failed write must not be announced");
    }

    #[tokio::test]
    async fn test_unchanged_status_only_refreshes_timestamp() {
        let clock = ManualClock::new(start_time());
        let a = target("https://a.example");
        let store = Arc::new(MemoryStore::with_targets(vec![a.clone()]));
        let probe = Arc::new(ScriptedProbe::new(&clock));
        probe.answer(&a.url, ProbeOutcome::up(200, 1));
        let events = StatusEvents::new();
        let mut rx = events.subscribe();
        let monitor = monitor(&store, &probe, &clock, &events, &config(60, 5));

        let first = monitor.run_cycle().await;
        let checked_first = store.find(a.id).unwrap().last_checked_at.unwrap();
        clock.advance(Duration::from_secs(55));
        let second = monitor.run_cycle().await;
        let after = store.find(a.id).unwrap();

        assert_eq!(first.changed, 1);
        assert_eq!(second.changed, 0);
        assert_eq!(after.status, TargetStatus::Up);
        assert!(after.last_checked_at.unwrap() > checked_first);

        assert_eq!(rx.try_recv().unwrap().current, TargetStatus::Up);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transition_publishes_event() {
        let clock = ManualClock::new(start_time());
        let a = target("https://a.example");
        let store = Arc::new(MemoryStore::with_targets(vec![a.clone()]));
        let probe = Arc::new(ScriptedProbe::new(&clock));
        probe.answer(&a.url, ProbeOutcome::up(200, 1));
        let events = StatusEvents::new();
        let monitor = monitor(&store, &probe, &clock, &events, &config(60, 5));
        monitor.run_cycle().await;

        let mut rx = events.subscribe();
        probe.answer(&a.url, ProbeOutcome::unexpected_status(503, 200, 1));
        monitor.run_cycle().await;

        let change = rx.try_recv().unwrap();
        assert_eq!(change.target_id, a.id);
        assert_eq!(change.previous, TargetStatus::Up);
        assert_eq!(change.current, TargetStatus::Down);
        assert_eq!(Some(change.at), store.find(a.id).unwrap().last_checked_at);
    }

    #[tokio::test]
    async fn test_stagger_delay_follows_each_target() {
        let clock = ManualClock::new(start_time());
        let targets: Vec<_> = (0..3).map(|i| target(&format!("https://{i}.example"))).collect();
        let store = Arc::new(MemoryStore::with_targets(targets));
        let probe = Arc::new(ScriptedProbe::new(&clock));

        let report = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5))
            .run_cycle()
            .await;

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 3]);
        assert_eq!(report.staggered, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_cycle_duration_bounds() {
        let n = 4u32;
        let delay = Duration::from_secs(5);
        let timeout = Duration::from_secs(15);

        for latency in [Duration::ZERO, timeout] {
            let clock = ManualClock::new(start_time());
            let targets: Vec<_> = (0..n).map(|i| target(&format!("https://{i}.example"))).collect();
            let store = Arc::new(MemoryStore::with_targets(targets));
            let probe = Arc::new(ScriptedProbe::new(&clock).with_latency(latency));
            let monitor = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5));

            let started = clock.now();
            monitor.run_cycle().await;
            let elapsed = (clock.now() - started).to_std().unwrap();

            assert!(elapsed >= delay * (n - 1));
            assert!(elapsed <= (delay + timeout) * n);
        }
    }

    #[tokio::test]
    async fn test_empty_store_completes_immediately() {
        let clock = ManualClock::new(start_time());
        let store = Arc::new(MemoryStore::new());
        let probe = Arc::new(ScriptedProbe::new(&clock));

        let report = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5))
            .run_cycle()
            .await;

        assert_eq!(report, CycleReport::default());
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_skips_cycle() {
        let clock = ManualClock::new(start_time());
        let store = Arc::new(MemoryStore::with_targets(vec![target("https://a.example")]));
        store.set_fail_reads(true);
        let probe = Arc::new(ScriptedProbe::new(&clock));

        let report = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5))
            .run_cycle()
            .await;

        assert!(report.skipped);
        assert!(probe.calls().is_empty());
        assert!(store.update_calls().is_empty());
    }

    #[test]
    fn test_remaining_cycle_time_is_clamped() {
        let secs = Duration::from_secs;
        assert_eq!(remaining_cycle_time(secs(60), secs(0)), secs(60));
        assert_eq!(remaining_cycle_time(secs(60), secs(15)), secs(45));
        assert_eq!(remaining_cycle_time(secs(60), secs(60)), Duration::ZERO);
        assert_eq!(remaining_cycle_time(secs(60), secs(75)), Duration::ZERO);
    }

    async fn drive(handle: &tokio::task::JoinHandle<()>) {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_run_sleeps_remainder_of_interval() {
        let clock = ManualClock::new(start_time());
        let targets = vec![target("https://a.example"), target("https://b.example")];
        let store = Arc::new(MemoryStore::with_targets(targets));
        let probe = Arc::new(ScriptedProbe::new(&clock));

        let handle = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5)).spawn();
        drive(&handle).await;

        let sleeps = clock.sleeps();
        let secs = Duration::from_secs;
        assert!(sleeps.len() >= 6, "loop should complete at least two cycles");
        assert_eq!(&sleeps[..6], &[secs(5), secs(5), secs(50), secs(5), secs(5), secs(50)]);
    }

    #[tokio::test]
    async fn test_run_never_sleeps_negative_when_stagger_exceeds_interval() {
        let clock = ManualClock::new(start_time());
        let targets: Vec<_> = (0..3).map(|i| target(&format!("https://{i}.example"))).collect();
        let store = Arc::new(MemoryStore::with_targets(targets));
        let probe = Arc::new(ScriptedProbe::new(&clock));

        let handle = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(10, 5)).spawn();
        drive(&handle).await;

        let sleeps = clock.sleeps();
        assert!(sleeps.len() >= 4);
        assert_eq!(sleeps[3], Duration::ZERO);
        assert!(probe.calls().len() > 3, "next cycle should start right away");
    }

    #[tokio::test]
    async fn test_run_waits_full_interval_after_read_failure() {
        let clock = ManualClock::new(start_time());
        let store = Arc::new(MemoryStore::with_targets(vec![target("https://a.example")]));
        store.set_fail_reads(true);
        let probe = Arc::new(ScriptedProbe::new(&clock));

        let handle = monitor(&store, &probe, &clock, &StatusEvents::new(), &config(60, 5)).spawn();
        drive(&handle).await;

        let sleeps = clock.sleeps();
        assert!(!sleeps.is_empty());
        assert!(sleeps.iter().all(|s| *s == Duration::from_secs(60)));
    }
}
