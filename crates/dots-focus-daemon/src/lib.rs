pub mod config;
pub mod daemon;
pub mod dbus_impl;
pub mod enforcer;
pub mod host_scheduler;
pub mod memory;
pub mod ports;
pub mod report;
pub mod reschedule;
pub mod rule_cache;
pub mod schedule_registry;
pub mod storage;

pub use enforcer::{EnforceError, RuleEnforcer};
pub use host_scheduler::TokioHostScheduler;
pub use ports::{
    Clock, HostScheduler, ManagedAppLookup, NotificationHistoryStore, PersistentKeyValueStore,
    RuleLookup, SystemClock,
};
pub use report::{DispatchOutcome, ReportDispatcher, ReportSink};
pub use reschedule::RescheduleCoordinator;
pub use rule_cache::CachedRuleLookup;
pub use schedule_registry::AlarmScheduleRegistry;
pub use storage::SqliteStore;
