// Reschedule Coordinator
//
// Brings pending report alarms back in line with the rules. Runs on boot,
// because host scheduler arming does not survive a restart, and whenever a
// rule is edited or deleted. Packages are processed concurrently up to a
// fixed limit and one failing package never stops the batch.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use dots_focus_common::{BlockDecisionEngine, ReconcileSummary, Rule, TransitionCalculator};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::enforcer::{resolve, EnforceError, Resolution};
use crate::ports::{Clock, ManagedAppLookup, RuleLookup};
use crate::rule_cache::CachedRuleLookup;
use crate::schedule_registry::AlarmScheduleRegistry;

pub const DEFAULT_RECONCILE_CONCURRENCY: usize = 8;

/// When the pending report for a package governed by `rule` should fire.
///
/// A rule that blocks now reports at its next transition, or never. A rule
/// that already allows means the report is overdue, so it fires at `now`.
pub fn reconcile_target<Z: TimeZone>(rule: &Rule, now: &DateTime<Z>) -> Option<DateTime<Utc>> {
    if BlockDecisionEngine::is_blocked(rule, now) {
        TransitionCalculator::next_transition(rule, now).instant()
    } else {
        Some(now.with_timezone(&Utc))
    }
}

#[derive(Clone, Copy)]
enum Pass<'r> {
    Recorded,
    Edited(&'r Rule),
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Rearmed,
    Dropped,
    /// Nothing to do, e.g. the entry disappeared concurrently
    Untouched,
}

pub struct RescheduleCoordinator {
    apps: Arc<dyn ManagedAppLookup>,
    rules: Arc<CachedRuleLookup>,
    registry: Arc<AlarmScheduleRegistry>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl RescheduleCoordinator {
    pub fn new(
        apps: Arc<dyn ManagedAppLookup>,
        rules: Arc<CachedRuleLookup>,
        registry: Arc<AlarmScheduleRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { apps, rules, registry, clock, concurrency: DEFAULT_RECONCILE_CONCURRENCY }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Re-arms every recorded alarm from the current time, dropping records
    /// whose app or rule is gone.
    pub async fn on_boot(&self) -> Result<ReconcileSummary> {
        let packages = self.registry.list_scheduled().await?;
        info!("Reconciling {} pending report alarms", packages.len());

        let summary = self.fan_out(packages.into_iter().collect(), Pass::Recorded).await;

        info!(
            "Boot reconciliation finished: {} rearmed, {} dropped, {} failed",
            summary.rearmed, summary.dropped, summary.failed
        );
        Ok(summary)
    }

    /// Recomputes pending alarms of every package bound to the edited rule.
    pub async fn on_rule_edited(&self, rule: &Rule) -> Result<ReconcileSummary> {
        self.rules.invalidate(rule.id);

        let apps = self.apps.by_rule_id(rule.id).await?;
        debug!("Rule '{}' edited, checking {} bound packages", rule.name, apps.len());

        let packages = apps.into_iter().map(|app| app.package_id).collect();
        let summary = self.fan_out(packages, Pass::Edited(rule)).await;

        info!(
            "Rule '{}' reconciled: {} rearmed, {} dropped, {} failed",
            rule.name, summary.rearmed, summary.dropped, summary.failed
        );
        Ok(summary)
    }

    /// Cancels pending alarms of the packages that were bound to a rule that
    /// is going away. Callers unbind the packages before calling this.
    pub async fn on_rule_deleted(
        &self,
        rule_id: Uuid,
        unbound: Vec<String>,
    ) -> Result<ReconcileSummary> {
        self.rules.invalidate(rule_id);

        let summary = self.fan_out(unbound, Pass::Deleted).await;

        info!("Rule {} deleted: {} pending reports dropped", rule_id, summary.dropped);
        Ok(summary)
    }

    /// Reconciles one package after its binding changed.
    pub async fn on_app_bound(&self, package_id: &str) -> Result<ReconcileSummary> {
        let now = self.clock.now();
        let mut summary = ReconcileSummary::default();
        tally(&mut summary, package_id, self.reconcile_recorded(package_id, &now).await);
        Ok(summary)
    }

    async fn fan_out(&self, packages: Vec<String>, pass: Pass<'_>) -> ReconcileSummary {
        let now = self.clock.now();

        let results: Vec<(String, Result<ItemOutcome>)> = stream::iter(packages)
            .map(|package_id| async move {
                let result = match pass {
                    Pass::Recorded => self.reconcile_recorded(&package_id, &now).await,
                    Pass::Edited(rule) => self.reconcile_with_rule(&package_id, rule, &now).await,
                    Pass::Deleted => self.drop_entry(&package_id).await,
                };
                (package_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = ReconcileSummary::default();
        for (package_id, result) in results {
            tally(&mut summary, &package_id, result);
        }
        summary
    }

    /// Reconciles a package that has a recorded alarm, resolving its rule.
    async fn reconcile_recorded(
        &self,
        package_id: &str,
        now: &DateTime<Tz>,
    ) -> Result<ItemOutcome> {
        if !self.registry.is_scheduled(package_id).await? {
            return Ok(ItemOutcome::Untouched);
        }

        match resolve(self.apps.as_ref(), self.rules.as_ref(), package_id).await {
            Ok(Resolution::Governed(rule)) => self.rearm_for(package_id, &rule, now).await,
            Ok(Resolution::Unmanaged) => {
                warn!("Dropping alarm for {}: package is no longer managed", package_id);
                self.drop_entry(package_id).await
            }
            Err(EnforceError::InvariantViolation { rule_id, .. }) => {
                error!("Dropping alarm for {}: rule {} does not exist", package_id, rule_id);
                self.drop_entry(package_id).await
            }
            Err(EnforceError::Storage(e)) => Err(e),
        }
    }

    async fn reconcile_with_rule(
        &self,
        package_id: &str,
        rule: &Rule,
        now: &DateTime<Tz>,
    ) -> Result<ItemOutcome> {
        if !self.registry.is_scheduled(package_id).await? {
            return Ok(ItemOutcome::Untouched);
        }
        self.rearm_for(package_id, rule, now).await
    }

    async fn rearm_for(
        &self,
        package_id: &str,
        rule: &Rule,
        now: &DateTime<Tz>,
    ) -> Result<ItemOutcome> {
        let Some(target) = reconcile_target(rule, now) else {
            debug!("Rule '{}' never unblocks, dropping alarm for {}", rule.name, package_id);
            return self.drop_entry(package_id).await;
        };

        if self.registry.rearm(package_id, target.timestamp_millis()).await? {
            debug!("Re-armed {} for {}", package_id, target);
            Ok(ItemOutcome::Rearmed)
        } else {
            Ok(ItemOutcome::Untouched)
        }
    }

    async fn drop_entry(&self, package_id: &str) -> Result<ItemOutcome> {
        if self.registry.cancel(package_id).await? {
            Ok(ItemOutcome::Dropped)
        } else {
            Ok(ItemOutcome::Untouched)
        }
    }
}

fn tally(summary: &mut ReconcileSummary, package_id: &str, result: Result<ItemOutcome>) {
    match result {
        Ok(ItemOutcome::Rearmed) => summary.rearmed += 1,
        Ok(ItemOutcome::Dropped) => summary.dropped += 1,
        Ok(ItemOutcome::Untouched) => {}
        Err(e) => {
            warn!("Failed to reconcile alarm for {}: {:#}", package_id, e);
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use dots_focus_common::{ManagedApp, RuleType, TimeRange, WeekDay};

    use super::*;
    use crate::memory::{FixedClock, InMemoryStore, RecordingScheduler};

    struct Harness {
        store: Arc<InMemoryStore>,
        scheduler: Arc<RecordingScheduler>,
        registry: Arc<AlarmScheduleRegistry>,
        coordinator: RescheduleCoordinator,
    }

    // 2026-10-13 is a Tuesday
    fn tuesday_at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 13, hour, minute, 0).unwrap()
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let registry = Arc::new(AlarmScheduleRegistry::new(store.clone(), scheduler.clone()));
        let rules = Arc::new(CachedRuleLookup::new(store.clone(), 16));
        let coordinator = RescheduleCoordinator::new(
            store.clone(),
            rules,
            registry.clone(),
            Arc::new(FixedClock::at_utc(now)),
        )
        .with_concurrency(2);
        Harness { store, scheduler, registry, coordinator }
    }

    fn restrictive(days: &[WeekDay], range: TimeRange) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            name: "Work".to_string(),
            days: days.iter().copied().collect(),
            time_ranges: vec![range],
            rule_type: RuleType::Restrictive,
        }
    }

    #[test]
    fn test_reconcile_target() {
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));

        let blocked_now = tuesday_at(12, 20);
        assert_eq!(reconcile_target(&rule, &blocked_now), Some(tuesday_at(18, 1)));

        let allowed_now = tuesday_at(19, 0);
        assert_eq!(reconcile_target(&rule, &allowed_now), Some(tuesday_at(19, 0)));

        let forever = restrictive(&WeekDay::ALL, TimeRange::all_day());
        assert_eq!(reconcile_target(&forever, &blocked_now), None);
    }

    #[tokio::test]
    async fn test_boot_rearms_without_duplicating_records() {
        let h = harness(tuesday_at(12, 20));
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        for package_id in ["a", "b", "c"] {
            h.store.bind(package_id, rule.id);
            h.registry.schedule(package_id, 1).await.unwrap();
        }
        h.scheduler.clear();

        let summary = h.coordinator.on_boot().await.unwrap();

        assert_eq!(summary, ReconcileSummary { rearmed: 3, dropped: 0, failed: 0 });
        assert_eq!(h.registry.list_scheduled().await.unwrap().len(), 3);
        let armed = h.scheduler.armed();
        assert_eq!(armed.len(), 3);
        assert!(armed.values().all(|when| *when == tuesday_at(18, 1).timestamp_millis()));
    }

    #[tokio::test]
    async fn test_boot_drops_stale_entries() {
        let h = harness(tuesday_at(12, 20));
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        h.store.bind("kept", rule.id);
        h.store.bind("orphaned", Uuid::new_v4());
        for package_id in ["kept", "orphaned", "unmanaged"] {
            h.registry.schedule(package_id, 1).await.unwrap();
        }

        let summary = h.coordinator.on_boot().await.unwrap();

        assert_eq!(summary, ReconcileSummary { rearmed: 1, dropped: 2, failed: 0 });
        let remaining: Vec<String> = h.registry.list_scheduled().await.unwrap().into_iter().collect();
        assert_eq!(remaining, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_boot_isolates_failures() {
        let h = harness(tuesday_at(12, 20));
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        for package_id in ["a", "broken", "c"] {
            h.store.bind(package_id, rule.id);
            h.registry.schedule(package_id, 1).await.unwrap();
        }
        h.store.fail_package("broken");

        let summary = h.coordinator.on_boot().await.unwrap();

        assert_eq!(summary, ReconcileSummary { rearmed: 2, dropped: 0, failed: 1 });
        // The failed entry is kept for the next attempt
        assert!(h.registry.is_scheduled("broken").await.unwrap());
    }

    #[tokio::test]
    async fn test_boot_fires_overdue_reports_immediately() {
        let now = tuesday_at(19, 0);
        let h = harness(now);
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        h.store.bind("a", rule.id);
        h.registry.schedule("a", tuesday_at(18, 1).timestamp_millis()).await.unwrap();

        h.coordinator.on_boot().await.unwrap();

        assert_eq!(h.scheduler.armed().get("alarm:a"), Some(&now.timestamp_millis()));
    }

    #[tokio::test]
    async fn test_boot_drops_entries_of_rules_that_never_unblock() {
        let h = harness(tuesday_at(12, 20));
        let rule = restrictive(&WeekDay::ALL, TimeRange::all_day());
        h.store.put_rule(rule.clone());
        h.store.bind("a", rule.id);
        h.registry.schedule("a", 1).await.unwrap();

        let summary = h.coordinator.on_boot().await.unwrap();

        assert_eq!(summary.dropped, 1);
        assert!(!h.registry.is_scheduled("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_rule_edit_rearms_only_scheduled_packages() {
        let h = harness(tuesday_at(12, 20));
        let mut rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        h.store.bind("scheduled", rule.id);
        h.store.bind("idle", rule.id);
        h.registry.schedule("scheduled", tuesday_at(18, 1).timestamp_millis()).await.unwrap();

        rule.time_ranges = vec![TimeRange::new(8, 0, 20, 0)];
        h.store.put_rule(rule.clone());
        let summary = h.coordinator.on_rule_edited(&rule).await.unwrap();

        assert_eq!(summary, ReconcileSummary { rearmed: 1, dropped: 0, failed: 0 });
        assert!(!h.registry.is_scheduled("idle").await.unwrap());
        assert_eq!(
            h.registry.entry("scheduled").await.unwrap().unwrap().scheduled_at_millis,
            tuesday_at(20, 1).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_rule_edit_invalidates_cache() {
        let h = harness(tuesday_at(12, 20));
        let mut rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        h.store.bind("a", rule.id);
        h.registry.schedule("a", 1).await.unwrap();

        // Warm the cache with the old definition
        h.coordinator.on_boot().await.unwrap();

        rule.time_ranges = vec![TimeRange::new(8, 0, 13, 0)];
        h.store.put_rule(rule.clone());
        h.coordinator.on_rule_edited(&rule).await.unwrap();
        h.coordinator.on_boot().await.unwrap();

        assert_eq!(
            h.registry.entry("a").await.unwrap().unwrap().scheduled_at_millis,
            tuesday_at(13, 1).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_rule_deleted_cancels_bound_alarms() {
        let h = harness(tuesday_at(12, 20));
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        h.registry.schedule("a", 1).await.unwrap();
        h.registry.schedule("other", 1).await.unwrap();

        let unbound = vec!["a".to_string(), "b".to_string()];
        let summary = h.coordinator.on_rule_deleted(rule.id, unbound).await.unwrap();

        assert_eq!(summary, ReconcileSummary { rearmed: 0, dropped: 1, failed: 0 });
        let armed: Vec<String> = h.scheduler.armed().into_keys().collect();
        assert_eq!(armed, vec!["alarm:other".to_string()]);
    }

    #[tokio::test]
    async fn test_app_bound_uses_new_rule() {
        let h = harness(tuesday_at(12, 20));
        let short = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 14, 0));
        h.store.put_rule(short.clone());
        h.store.bind("a", short.id);
        h.registry.schedule("a", tuesday_at(18, 1).timestamp_millis()).await.unwrap();

        let summary = h.coordinator.on_app_bound("a").await.unwrap();

        assert_eq!(summary.rearmed, 1);
        assert_eq!(h.scheduler.armed().get("alarm:a"), Some(&tuesday_at(14, 1).timestamp_millis()));
        assert_eq!(h.coordinator.on_app_bound("unscheduled").await.unwrap().total(), 0);
    }

    /// App lookup that measures how many calls overlap.
    struct GaugedApps {
        inner: Arc<InMemoryStore>,
        in_flight: AtomicUsize,
        high_water: AtomicUsize,
    }

    #[async_trait]
    impl ManagedAppLookup for GaugedApps {
        async fn by_package_id(&self, package_id: &str) -> Result<Option<ManagedApp>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.by_package_id(package_id).await
        }

        async fn by_rule_id(&self, rule_id: Uuid) -> Result<Vec<ManagedApp>> {
            self.inner.by_rule_id(rule_id).await
        }
    }

    #[tokio::test]
    async fn test_large_batch_respects_limit() {
        let h = harness(tuesday_at(12, 20) + Duration::minutes(1));
        let rule = restrictive(&[WeekDay::Tuesday], TimeRange::new(8, 0, 18, 0));
        h.store.put_rule(rule.clone());
        for i in 0..40 {
            let package_id = format!("pkg-{}", i);
            h.store.bind(&package_id, rule.id);
            h.registry.schedule(&package_id, 1).await.unwrap();
        }

        let apps = Arc::new(GaugedApps {
            inner: h.store.clone(),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        });
        let coordinator = RescheduleCoordinator::new(
            apps.clone(),
            Arc::new(CachedRuleLookup::new(h.store.clone(), 16)),
            h.registry.clone(),
            Arc::new(FixedClock::at_utc(tuesday_at(12, 21))),
        )
        .with_concurrency(3);

        let summary = coordinator.on_boot().await.unwrap();

        assert_eq!(summary.rearmed, 40);
        assert_eq!(apps.high_water.load(Ordering::SeqCst), 3);
        assert_eq!(apps.in_flight.load(Ordering::SeqCst), 0);
    }
}
