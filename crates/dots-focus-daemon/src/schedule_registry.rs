// Alarm Schedule Registry
//
// Durable set of packages with a pending deferred-report alarm. Records live
// in the key-value store under `alarm:<package>`; the host scheduler arming
// is forwarded but never persisted, so it has to be re-armed after a restart.
//
// Every mutation for one package runs under that package's async lock.
// Different packages never contend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dots_focus_common::ScheduleEntry;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::ports::{HostScheduler, PersistentKeyValueStore};

pub const ALARM_KEY_PREFIX: &str = "alarm:";

pub fn alarm_key(package_id: &str) -> String {
    format!("{}{}", ALARM_KEY_PREFIX, package_id)
}

/// Package id encoded in an alarm key, if it is one.
pub fn package_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(ALARM_KEY_PREFIX).filter(|package_id| !package_id.is_empty())
}

pub struct AlarmScheduleRegistry {
    store: Arc<dyn PersistentKeyValueStore>,
    scheduler: Arc<dyn HostScheduler>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AlarmScheduleRegistry {
    pub fn new(store: Arc<dyn PersistentKeyValueStore>, scheduler: Arc<dyn HostScheduler>) -> Self {
        Self { store, scheduler, locks: Mutex::new(HashMap::new()) }
    }

    async fn lock(&self, package_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries nobody holds or waits on can go
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(package_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Records a pending alarm for the package and arms the host scheduler.
    /// Scheduling the same package again replaces its target.
    pub async fn schedule(&self, package_id: &str, when_millis: i64) -> Result<()> {
        let _guard = self.lock(package_id).await;
        self.write_and_arm(package_id, when_millis).await
    }

    /// Makes sure an alarm at or before `target` is pending.
    ///
    /// An existing record is kept when its target is no later than `target`
    /// and still in the future. Otherwise the record is rewritten and armed.
    /// Returns whether anything was armed.
    pub async fn ensure_scheduled(
        &self,
        package_id: &str,
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.lock(package_id).await;

        if let Some(existing) = self.read_entry(package_id).await? {
            if let Some(existing_at) = existing.scheduled_at() {
                if existing_at <= target && existing_at > now {
                    debug!("Alarm for {} already pending at {}", package_id, existing_at);
                    return Ok(false);
                }
            }
        }

        self.write_and_arm(package_id, target.timestamp_millis()).await?;
        Ok(true)
    }

    /// Replaces the arming of an existing record with a new target.
    ///
    /// Does nothing and returns false when the package has no record, so a
    /// concurrently completed alarm is not brought back.
    pub async fn rearm(&self, package_id: &str, when_millis: i64) -> Result<bool> {
        let _guard = self.lock(package_id).await;

        if self.store.get(&alarm_key(package_id)).await?.is_none() {
            return Ok(false);
        }

        self.scheduler.cancel(&alarm_key(package_id));
        self.write_and_arm(package_id, when_millis).await?;
        Ok(true)
    }

    /// Like `rearm`, but only while the record still targets
    /// `fired_millis`. A record moved in the meantime is left alone.
    pub async fn rearm_if(
        &self,
        package_id: &str,
        fired_millis: i64,
        when_millis: i64,
    ) -> Result<bool> {
        let _guard = self.lock(package_id).await;

        if !self.targets(package_id, fired_millis).await? {
            return Ok(false);
        }

        self.scheduler.cancel(&alarm_key(package_id));
        self.write_and_arm(package_id, when_millis).await?;
        Ok(true)
    }

    /// Removes the record and cancels its host arming. Returns whether a
    /// record existed; without one the host scheduler is left alone.
    pub async fn cancel(&self, package_id: &str) -> Result<bool> {
        let _guard = self.lock(package_id).await;
        let key = alarm_key(package_id);

        let existed = self.store.delete(&key).await?;
        if existed {
            self.scheduler.cancel(&key);
            debug!("Canceled alarm for {}", package_id);
        }
        Ok(existed)
    }

    /// Removes the record of an alarm that already fired.
    pub async fn complete(&self, package_id: &str) -> Result<bool> {
        let _guard = self.lock(package_id).await;
        Ok(self.store.delete(&alarm_key(package_id)).await?)
    }

    /// Removes a fired record unless it was moved to another target since.
    pub async fn complete_if(&self, package_id: &str, fired_millis: i64) -> Result<bool> {
        let _guard = self.lock(package_id).await;

        if !self.targets(package_id, fired_millis).await? {
            return Ok(false);
        }
        Ok(self.store.delete(&alarm_key(package_id)).await?)
    }

    pub async fn is_scheduled(&self, package_id: &str) -> Result<bool> {
        Ok(self.store.get(&alarm_key(package_id)).await?.is_some())
    }

    pub async fn entry(&self, package_id: &str) -> Result<Option<ScheduleEntry>> {
        self.read_entry(package_id).await
    }

    pub async fn list_scheduled(&self) -> Result<BTreeSet<String>> {
        let keys = self.store.keys(ALARM_KEY_PREFIX).await.context("Failed to list alarm keys")?;
        Ok(keys.iter().filter_map(|key| package_from_key(key)).map(str::to_string).collect())
    }

    /// Every readable record, ordered by package id.
    pub async fn entries(&self) -> Result<Vec<ScheduleEntry>> {
        let mut entries = Vec::new();
        for package_id in self.list_scheduled().await? {
            if let Some(entry) = self.read_entry(&package_id).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn read_entry(&self, package_id: &str) -> Result<Option<ScheduleEntry>> {
        let Some(raw) = self.store.get(&alarm_key(package_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ScheduleEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("Unreadable alarm record for {}: {}", package_id, e);
                Ok(None)
            }
        }
    }

    async fn targets(&self, package_id: &str, millis: i64) -> Result<bool> {
        let entry = self.read_entry(package_id).await?;
        Ok(entry.is_some_and(|entry| entry.scheduled_at_millis == millis))
    }

    async fn write_and_arm(&self, package_id: &str, when_millis: i64) -> Result<()> {
        let key = alarm_key(package_id);
        let entry =
            ScheduleEntry { package_id: package_id.to_string(), scheduled_at_millis: when_millis };
        let value = serde_json::to_string(&entry)?;

        self.store
            .set(&key, &value)
            .await
            .with_context(|| format!("Failed to record alarm for {}", package_id))?;
        self.scheduler.arm_at(&key, when_millis);

        debug!("Armed alarm for {} at {}", package_id, when_millis);
        Ok(())
    }
}
