//! In-memory collaborators.
//!
//! Test doubles for the collaborator traits, shared by the unit and
//! integration tests. Nothing here is durable.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dots_focus_common::{AppNotification, ManagedApp, Rule};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::ports::{
    Clock, HostScheduler, ManagedAppLookup, NotificationHistoryStore, PersistentKeyValueStore,
    RuleLookup,
};

/// Implements every storage-side collaborator over plain maps.
#[derive(Default)]
pub struct InMemoryStore {
    apps: Mutex<HashMap<String, ManagedApp>>,
    rules: Mutex<HashMap<Uuid, Rule>>,
    history: Mutex<Vec<AppNotification>>,
    values: Mutex<BTreeMap<String, String>>,
    failing_packages: Mutex<HashSet<String>>,
    rule_reads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_rule(&self, rule: Rule) {
        self.rules.lock().insert(rule.id, rule);
    }

    pub fn bind(&self, package_id: &str, rule_id: Uuid) {
        self.apps
            .lock()
            .insert(package_id.to_string(), ManagedApp { package_id: package_id.to_string(), rule_id });
    }

    pub fn history(&self) -> Vec<AppNotification> {
        self.history.lock().clone()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Makes every app lookup for `package_id` fail with a storage error.
    pub fn fail_package(&self, package_id: &str) {
        self.failing_packages.lock().insert(package_id.to_string());
    }

    /// Number of `RuleLookup::by_id` calls served so far.
    pub fn rule_reads(&self) -> usize {
        self.rule_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedAppLookup for InMemoryStore {
    async fn by_package_id(&self, package_id: &str) -> Result<Option<ManagedApp>> {
        if self.failing_packages.lock().contains(package_id) {
            return Err(anyhow!("lookup failed for {}", package_id));
        }
        Ok(self.apps.lock().get(package_id).cloned())
    }

    async fn by_rule_id(&self, rule_id: Uuid) -> Result<Vec<ManagedApp>> {
        let mut apps: Vec<ManagedApp> =
            self.apps.lock().values().filter(|app| app.rule_id == rule_id).cloned().collect();
        apps.sort_by(|a, b| a.package_id.cmp(&b.package_id));
        Ok(apps)
    }
}

#[async_trait]
impl RuleLookup for InMemoryStore {
    async fn by_id(&self, rule_id: Uuid) -> Result<Option<Rule>> {
        self.rule_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rules.lock().get(&rule_id).cloned())
    }
}

#[async_trait]
impl NotificationHistoryStore for InMemoryStore {
    async fn insert(&self, notification: &AppNotification) -> Result<()> {
        self.history.lock().push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl PersistentKeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.values.lock().keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Arm { key: String, when_millis: i64 },
    Cancel { key: String },
}

/// Host scheduler that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<SchedulerCall>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().clone()
    }

    /// Keys currently armed, with their target, after replaying every call.
    pub fn armed(&self) -> HashMap<String, i64> {
        let mut armed = HashMap::new();
        for call in self.calls.lock().iter() {
            match call {
                SchedulerCall::Arm { key, when_millis } => {
                    armed.insert(key.clone(), *when_millis);
                }
                SchedulerCall::Cancel { key } => {
                    armed.remove(key);
                }
            }
        }
        armed
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl HostScheduler for RecordingScheduler {
    fn arm_at(&self, key: &str, when_millis: i64) {
        self.calls.lock().push(SchedulerCall::Arm { key: key.to_string(), when_millis });
    }

    fn cancel(&self, key: &str) {
        self.calls.lock().push(SchedulerCall::Cancel { key: key.to_string() });
    }
}

/// Clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Tz>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn at_utc(now: DateTime<Utc>) -> Self {
        Self::in_zone(now, chrono_tz::UTC)
    }

    pub fn in_zone(now: DateTime<Utc>, zone: Tz) -> Self {
        Self::new(now.with_timezone(&zone))
    }

    /// Moves to `now`, staying in the current zone.
    pub fn set(&self, now: DateTime<Utc>) {
        let mut current = self.now.lock();
        *current = now.with_timezone(&current.timezone());
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock()
    }
}
