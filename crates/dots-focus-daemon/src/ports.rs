// Collaborator interfaces
//
// Everything the enforcement core needs from the outside world. Production
// implementations live in `storage` and `host_scheduler`; in-memory ones in
// `memory`.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dots_focus_common::{AppNotification, ManagedApp, Rule};
use uuid::Uuid;

#[async_trait]
pub trait ManagedAppLookup: Send + Sync {
    async fn by_package_id(&self, package_id: &str) -> Result<Option<ManagedApp>>;

    async fn by_rule_id(&self, rule_id: Uuid) -> Result<Vec<ManagedApp>>;
}

#[async_trait]
pub trait RuleLookup: Send + Sync {
    async fn by_id(&self, rule_id: Uuid) -> Result<Option<Rule>>;
}

/// Write-only history of suppressed notifications.
#[async_trait]
pub trait NotificationHistoryStore: Send + Sync {
    async fn insert(&self, notification: &AppNotification) -> Result<()>;
}

#[async_trait]
pub trait PersistentKeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Timer service that wakes the daemon at a given instant.
///
/// Calls are fire-and-forget: arming is not confirmed and does not survive a
/// restart.
pub trait HostScheduler: Send + Sync {
    fn arm_at(&self, key: &str, when_millis: i64);

    fn cancel(&self, key: &str);
}

/// Source of "now" in the zone rules are evaluated in.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock in a named time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: Tz,
}

impl SystemClock {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }
}

/// The machine's zone from `$TZ`, else from the `/etc/localtime` link.
pub fn local_zone() -> Option<Tz> {
    if let Some(zone) = std::env::var("TZ").ok().and_then(|name| parse_zone(&name)) {
        return Some(zone);
    }
    let target = std::fs::read_link("/etc/localtime").ok()?;
    zone_from_zoneinfo_path(&target)
}

fn parse_zone(name: &str) -> Option<Tz> {
    name.trim().trim_start_matches(':').parse().ok()
}

fn zone_from_zoneinfo_path(path: &Path) -> Option<Tz> {
    let (_, name) = path.to_str()?.split_once("zoneinfo/")?;
    parse_zone(name)
}
