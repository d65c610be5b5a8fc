// Deferred Reports
//
// When a package's alarm fires, check that its rule really stopped blocking
// and tell the user that held notifications are available again. If the rule
// still blocks (it was edited, or the alarm fired early) the alarm moves to
// the next transition instead.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dots_focus_common::{BlockDecisionEngine, NextTransition, TransitionCalculator};
use dots_focus_proto::INTERFACE_NAME;
use notify_rust::{Notification as SystemNotification, Timeout, Urgency};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::enforcer::{resolve, EnforceError, Resolution};
use crate::ports::{Clock, ManagedAppLookup, RuleLookup};
use crate::schedule_registry::{package_from_key, AlarmScheduleRegistry};

/// Where "notifications are available again" reports go.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report_ready(&self, package_id: &str) -> Result<()>;
}

/// Shows reports as desktop notifications from a background task.
pub struct DesktopReportSink {
    sender: mpsc::UnboundedSender<String>,
}

impl DesktopReportSink {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(package_id) = receiver.recv().await {
                if let Err(e) = Self::show(&package_id) {
                    warn!("Failed to show report for {}: {}", package_id, e);
                }
            }
        });

        Self { sender }
    }

    fn show(package_id: &str) -> Result<()> {
        SystemNotification::new()
            .summary("Focus mode")
            .body(&format!("Notifications from {} are no longer held", package_id))
            .icon("appointment-soon")
            .urgency(Urgency::Normal)
            .timeout(Timeout::Milliseconds(8000))
            .show()?;

        info!("Desktop report shown for {}", package_id);
        Ok(())
    }
}

#[async_trait]
impl ReportSink for DesktopReportSink {
    async fn report_ready(&self, package_id: &str) -> Result<()> {
        self.sender
            .send(package_id.to_string())
            .map_err(|e| anyhow::anyhow!("Failed to queue report: {}", e))
    }
}

/// Emits the `ReportReady` D-Bus signal.
pub struct DbusReportSink {
    connection: zbus::Connection,
    object_path: String,
}

impl DbusReportSink {
    pub fn new(connection: zbus::Connection, object_path: impl Into<String>) -> Self {
        Self { connection, object_path: object_path.into() }
    }
}

#[async_trait]
impl ReportSink for DbusReportSink {
    async fn report_ready(&self, package_id: &str) -> Result<()> {
        self.connection
            .emit_signal(
                None::<()>,
                self.object_path.as_str(),
                INTERFACE_NAME,
                "ReportReady",
                &package_id,
            )
            .await?;

        debug!("Emitted ReportReady signal for {}", package_id);
        Ok(())
    }
}

/// Dry-run sink: only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn report_ready(&self, package_id: &str) -> Result<()> {
        info!("[DRY RUN] Would report held notifications for {}", package_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Reported,
    /// The rule still blocks; the alarm now targets the given instant
    Rearmed(DateTime<Utc>),
    /// The record was removed without a report
    Dropped,
    /// No matching record, e.g. canceled or moved while the alarm was in flight
    Ignored,
}

pub struct ReportDispatcher {
    apps: Arc<dyn ManagedAppLookup>,
    rules: Arc<dyn RuleLookup>,
    registry: Arc<AlarmScheduleRegistry>,
    clock: Arc<dyn Clock>,
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl ReportDispatcher {
    pub fn new(
        apps: Arc<dyn ManagedAppLookup>,
        rules: Arc<dyn RuleLookup>,
        registry: Arc<AlarmScheduleRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { apps, rules, registry, clock, sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Handles one fired host scheduler key.
    pub async fn on_alarm(&self, key: &str) -> Result<DispatchOutcome> {
        let Some(package_id) = package_from_key(key) else {
            warn!("Ignoring alarm with unknown key {}", key);
            return Ok(DispatchOutcome::Ignored);
        };

        let fired_millis = match self.registry.entry(package_id).await? {
            Some(entry) => entry.scheduled_at_millis,
            None => {
                if self.registry.complete(package_id).await? {
                    warn!("Dropped unreadable alarm record for {}", package_id);
                    return Ok(DispatchOutcome::Dropped);
                }
                debug!("Alarm for {} fired without a record", package_id);
                return Ok(DispatchOutcome::Ignored);
            }
        };

        let rule = match resolve(self.apps.as_ref(), self.rules.as_ref(), package_id).await {
            Ok(Resolution::Governed(rule)) => rule,
            Ok(Resolution::Unmanaged) => {
                warn!("Alarm fired for unmanaged package {}, dropping", package_id);
                return self.settle_dropped(package_id, fired_millis).await;
            }
            Err(EnforceError::InvariantViolation { rule_id, .. }) => {
                error!("Alarm for {} references missing rule {}, dropping", package_id, rule_id);
                return self.settle_dropped(package_id, fired_millis).await;
            }
            Err(EnforceError::Storage(e)) => return Err(e),
        };

        let now = self.clock.now();
        if BlockDecisionEngine::is_blocked(&rule, &now) {
            return match TransitionCalculator::next_transition(&rule, &now) {
                NextTransition::At(target) => {
                    if !self.registry.rearm_if(package_id, fired_millis, target.timestamp_millis()).await? {
                        debug!("Alarm for {} was moved while firing", package_id);
                        return Ok(DispatchOutcome::Ignored);
                    }
                    info!("Rule '{}' still blocks {}, report moved to {}", rule.name, package_id, target);
                    Ok(DispatchOutcome::Rearmed(target))
                }
                NextTransition::Never => {
                    info!("Rule '{}' no longer unblocks {}, dropping report", rule.name, package_id);
                    self.settle_dropped(package_id, fired_millis).await
                }
            };
        }

        if !self.registry.complete_if(package_id, fired_millis).await? {
            debug!("Alarm for {} was moved while firing", package_id);
            return Ok(DispatchOutcome::Ignored);
        }
        for sink in &self.sinks {
            if let Err(e) = sink.report_ready(package_id).await {
                warn!("Report sink failed for {}: {:#}", package_id, e);
            }
        }

        info!("Reported held notifications for {}", package_id);
        Ok(DispatchOutcome::Reported)
    }

    async fn settle_dropped(&self, package_id: &str, fired_millis: i64) -> Result<DispatchOutcome> {
        if self.registry.complete_if(package_id, fired_millis).await? {
            Ok(DispatchOutcome::Dropped)
        } else {
            Ok(DispatchOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use dots_focus_common::{Rule, RuleType, TimeRange, WeekDay};
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::memory::{FixedClock, InMemoryStore, RecordingScheduler};
    use crate::ports::PersistentKeyValueStore;

    #[derive(Default)]
    struct CollectingSink {
        reported: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReportSink for CollectingSink {
        async fn report_ready(&self, package_id: &str) -> Result<()> {
            self.reported.lock().push(package_id.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        async fn report_ready(&self, _package_id: &str) -> Result<()> {
            Err(anyhow::anyhow!("bus unavailable"))
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        registry: Arc<AlarmScheduleRegistry>,
        sink: Arc<CollectingSink>,
        dispatcher: ReportDispatcher,
    }

    // 2026-10-13 is a Tuesday
    fn tuesday_at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 13, hour, minute, 0).unwrap()
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let registry =
            Arc::new(AlarmScheduleRegistry::new(store.clone(), Arc::new(RecordingScheduler::new())));
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = ReportDispatcher::new(
            store.clone(),
            store.clone(),
            registry.clone(),
            Arc::new(FixedClock::at_utc(now)),
        )
        .with_sink(Arc::new(FailingSink))
        .with_sink(sink.clone());
        Harness { store, registry, sink, dispatcher }
    }

    fn bind_work_rule(store: &InMemoryStore, package_id: &str, ranges: Vec<TimeRange>) {
        let rule = Rule {
            id: Uuid::new_v4(),
            name: "Work".to_string(),
            days: [WeekDay::Tuesday].into_iter().collect(),
            time_ranges: ranges,
            rule_type: RuleType::Restrictive,
        };
        store.bind(package_id, rule.id);
        store.put_rule(rule);
    }

    #[tokio::test]
    async fn test_reports_once_rule_allows() {
        let h = harness(tuesday_at(18, 1));
        bind_work_rule(&h.store, "chat", vec![TimeRange::new(8, 0, 18, 0)]);
        h.registry.schedule("chat", tuesday_at(18, 1).timestamp_millis()).await.unwrap();

        let outcome = h.dispatcher.on_alarm("alarm:chat").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Reported);
        assert_eq!(*h.sink.reported.lock(), vec!["chat".to_string()]);
        assert!(!h.registry.is_scheduled("chat").await.unwrap());
    }

    #[tokio::test]
    async fn test_still_blocked_moves_alarm() {
        let h = harness(tuesday_at(18, 1));
        bind_work_rule(&h.store, "chat", vec![TimeRange::new(8, 0, 20, 0)]);
        h.registry.schedule("chat", tuesday_at(18, 1).timestamp_millis()).await.unwrap();

        let outcome = h.dispatcher.on_alarm("alarm:chat").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Rearmed(tuesday_at(20, 1)));
        assert!(h.sink.reported.lock().is_empty());
        assert_eq!(
            h.registry.entry("chat").await.unwrap().unwrap().scheduled_at_millis,
            tuesday_at(20, 1).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_missing_rule_drops_record() {
        let h = harness(tuesday_at(18, 1));
        h.store.bind("chat", Uuid::new_v4());
        h.registry.schedule("chat", 1).await.unwrap();

        assert_eq!(h.dispatcher.on_alarm("alarm:chat").await.unwrap(), DispatchOutcome::Dropped);
        assert!(!h.registry.is_scheduled("chat").await.unwrap());
        assert!(h.sink.reported.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unmanaged_package_drops_record() {
        let h = harness(tuesday_at(18, 1));
        h.registry.schedule("chat", 1).await.unwrap();

        assert_eq!(h.dispatcher.on_alarm("alarm:chat").await.unwrap(), DispatchOutcome::Dropped);
        assert!(!h.registry.is_scheduled("chat").await.unwrap());
    }

    #[tokio::test]
    async fn test_canceled_or_foreign_keys_are_ignored() {
        let h = harness(tuesday_at(18, 1));
        bind_work_rule(&h.store, "chat", vec![TimeRange::new(8, 0, 18, 0)]);

        assert_eq!(h.dispatcher.on_alarm("alarm:chat").await.unwrap(), DispatchOutcome::Ignored);
        assert_eq!(h.dispatcher.on_alarm("timer:chat").await.unwrap(), DispatchOutcome::Ignored);
        assert!(h.sink.reported.lock().is_empty());
    }

    /// Moves the alarm while the rule is being looked up, like a rule edit
    /// landing during dispatch.
    struct EditDuringLookup {
        store: Arc<InMemoryStore>,
        registry: Arc<AlarmScheduleRegistry>,
        moved_to: i64,
    }

    #[async_trait]
    impl RuleLookup for EditDuringLookup {
        async fn by_id(&self, rule_id: Uuid) -> Result<Option<Rule>> {
            self.registry.rearm("chat", self.moved_to).await?;
            self.store.by_id(rule_id).await
        }
    }

    #[tokio::test]
    async fn test_alarm_moved_during_dispatch_survives() {
        let h = harness(tuesday_at(18, 1));
        bind_work_rule(&h.store, "chat", vec![TimeRange::new(8, 0, 18, 0)]);
        h.registry.schedule("chat", tuesday_at(18, 1).timestamp_millis()).await.unwrap();

        let moved_to = tuesday_at(21, 31).timestamp_millis();
        let rules = Arc::new(EditDuringLookup {
            store: h.store.clone(),
            registry: h.registry.clone(),
            moved_to,
        });
        let dispatcher = ReportDispatcher::new(
            h.store.clone(),
            rules,
            h.registry.clone(),
            Arc::new(FixedClock::at_utc(tuesday_at(18, 1))),
        )
        .with_sink(h.sink.clone());

        assert_eq!(dispatcher.on_alarm("alarm:chat").await.unwrap(), DispatchOutcome::Ignored);
        assert!(h.sink.reported.lock().is_empty());
        assert_eq!(h.registry.entry("chat").await.unwrap().unwrap().scheduled_at_millis, moved_to);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_dropped() {
        let h = harness(tuesday_at(18, 1));
        bind_work_rule(&h.store, "chat", vec![TimeRange::new(8, 0, 18, 0)]);
        h.store.set("alarm:chat", "not json").await.unwrap();

        assert_eq!(h.dispatcher.on_alarm("alarm:chat").await.unwrap(), DispatchOutcome::Dropped);
        assert!(!h.registry.is_scheduled("chat").await.unwrap());
    }

    #[tokio::test]
    async fn test_log_sink_accepts_reports() {
        assert!(LogReportSink.report_ready("chat").await.is_ok());
    }
}
