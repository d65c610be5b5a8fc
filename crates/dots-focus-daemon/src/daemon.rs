use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use zbus::ConnectionBuilder;

use crate::config::DaemonConfig;
use crate::dbus_impl::FocusDaemonService;
use crate::enforcer::RuleEnforcer;
use crate::host_scheduler::TokioHostScheduler;
use crate::ports::{Clock, HostScheduler, SystemClock};
use crate::report::{DbusReportSink, DesktopReportSink, LogReportSink, ReportDispatcher, ReportSink};
use crate::reschedule::RescheduleCoordinator;
use crate::rule_cache::CachedRuleLookup;
use crate::schedule_registry::AlarmScheduleRegistry;
use crate::storage::SqliteStore;
use dots_focus_db::Database;

/// The enforcement components wired over one database.
pub struct FocusCore {
    pub db: Arc<Database>,
    pub store: Arc<SqliteStore>,
    pub rules: Arc<CachedRuleLookup>,
    pub registry: Arc<AlarmScheduleRegistry>,
    pub enforcer: Arc<RuleEnforcer>,
    pub coordinator: Arc<RescheduleCoordinator>,
    clock: Arc<dyn Clock>,
}

impl FocusCore {
    pub async fn open(
        config: &DaemonConfig,
        scheduler: Arc<dyn HostScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        info!("Initializing database");
        let db = Database::open((&config.database).into())
            .await
            .context("Failed to open database")?;
        let db = Arc::new(db);

        let store = Arc::new(SqliteStore::new(db.clone()));
        let rules =
            Arc::new(CachedRuleLookup::new(store.clone(), config.scheduling.rule_cache_capacity));
        let registry = Arc::new(AlarmScheduleRegistry::new(store.clone(), scheduler));

        let enforcer = Arc::new(RuleEnforcer::new(
            store.clone(),
            rules.clone(),
            store.clone(),
            registry.clone(),
            clock.clone(),
        ));
        let coordinator = Arc::new(
            RescheduleCoordinator::new(store.clone(), rules.clone(), registry.clone(), clock.clone())
                .with_concurrency(config.scheduling.reconcile_concurrency),
        );

        Ok(Self { db, store, rules, registry, enforcer, coordinator, clock })
    }

    pub fn dispatcher(&self, sinks: Vec<Arc<dyn ReportSink>>) -> ReportDispatcher {
        sinks.into_iter().fold(
            ReportDispatcher::new(
                self.store.clone(),
                self.rules.clone(),
                self.registry.clone(),
                self.clock.clone(),
            ),
            |dispatcher, sink| dispatcher.with_sink(sink),
        )
    }

    pub fn service(&self) -> FocusDaemonService {
        FocusDaemonService::new(
            self.db.clone(),
            self.enforcer.clone(),
            self.coordinator.clone(),
            self.registry.clone(),
        )
    }
}

fn report_sinks(config: &DaemonConfig, conn: &zbus::Connection) -> Vec<Arc<dyn ReportSink>> {
    let mut sinks: Vec<Arc<dyn ReportSink>> = Vec::new();
    if config.reports.dry_run {
        sinks.push(Arc::new(LogReportSink));
        return sinks;
    }

    sinks.push(Arc::new(DbusReportSink::new(conn.clone(), config.dbus.object_path.clone())));
    if config.reports.desktop_notifications {
        sinks.push(Arc::new(DesktopReportSink::new()));
    }
    sinks
}

/// Hands every fired alarm to the dispatcher until the channel closes.
pub async fn dispatch_alarms(
    dispatcher: Arc<ReportDispatcher>,
    mut fired: mpsc::UnboundedReceiver<String>,
) {
    while let Some(key) = fired.recv().await {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.on_alarm(&key).await {
                warn!("Failed to handle alarm {}: {:#}", key, e);
            }
        });
    }
}

pub async fn run(config: DaemonConfig) -> Result<()> {
    info!("Initializing daemon");
    config.validate()?;

    let zone = config.time_zone()?;
    info!("Evaluating rules in time zone {}", zone.name());

    let (scheduler, fired) = TokioHostScheduler::new();
    let clock = SystemClock::new(zone);
    let core = FocusCore::open(&config, Arc::new(scheduler), Arc::new(clock)).await?;

    // Host arming is lost on restart; recorded alarms must be re-armed first
    core.coordinator.on_boot().await.context("Failed to reconcile pending alarms")?;

    let builder =
        if config.dbus.system_bus { ConnectionBuilder::system()? } else { ConnectionBuilder::session()? };
    let conn = builder
        .name(config.dbus.service_name.as_str())?
        .serve_at(config.dbus.object_path.as_str(), core.service())?
        .build()
        .await
        .context("Failed to register DBus service")?;

    info!("DBus service registered at {}", config.dbus.service_name);

    let dispatcher = Arc::new(core.dispatcher(report_sinks(&config, &conn)));
    let alarm_loop = tokio::spawn(dispatch_alarms(dispatcher, fired));

    info!("Daemon running, waiting for shutdown signal...");

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down gracefully...");
    }

    alarm_loop.abort();
    drop(conn);
    core.db.close().await;
    info!("Daemon shutdown complete");

    Ok(())
}
