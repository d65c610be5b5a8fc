use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use dots_focus_common::{AppNotification, ManagedApp, ReconcileSummary, Rule, RuleValidator};
use dots_focus_db::queries::{ManagedAppQueries, RuleQueries};
use dots_focus_db::Database;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zbus::interface;

use crate::enforcer::RuleEnforcer;
use crate::reschedule::RescheduleCoordinator;
use crate::schedule_registry::AlarmScheduleRegistry;

pub struct FocusDaemonService {
    db: Arc<Database>,
    enforcer: Arc<RuleEnforcer>,
    coordinator: Arc<RescheduleCoordinator>,
    registry: Arc<AlarmScheduleRegistry>,
}

impl FocusDaemonService {
    pub fn new(
        db: Arc<Database>,
        enforcer: Arc<RuleEnforcer>,
        coordinator: Arc<RescheduleCoordinator>,
        registry: Arc<AlarmScheduleRegistry>,
    ) -> Self {
        Self { db, enforcer, coordinator, registry }
    }

    async fn store_rule(&self, rule_json: &str) -> Result<ReconcileSummary> {
        let rule: Rule = serde_json::from_str(rule_json).context("Invalid rule JSON")?;
        let rule = RuleValidator::validate(&rule)?;

        RuleQueries::upsert(&self.db, &rule).await?;
        info!("Stored rule '{}' ({})", rule.name, rule.id);

        self.coordinator.on_rule_edited(&rule).await
    }

    async fn remove_rule(&self, rule_id: &str) -> Result<ReconcileSummary> {
        let rule_id = Uuid::parse_str(rule_id).context("Invalid rule id")?;

        let mut unbound = Vec::new();
        for app in ManagedAppQueries::list_by_rule(&self.db, rule_id).await? {
            ManagedAppQueries::delete(&self.db, &app.package_id).await?;
            debug!("Unbound {} from deleted rule {}", app.package_id, rule_id);
            unbound.push(app.package_id);
        }

        let summary = self.coordinator.on_rule_deleted(rule_id, unbound).await?;
        RuleQueries::delete(&self.db, rule_id).await?;

        info!("Deleted rule {}", rule_id);
        Ok(summary)
    }

    async fn bind_app(&self, package_id: &str, rule_id: &str) -> Result<ReconcileSummary> {
        let rule_id = Uuid::parse_str(rule_id).context("Invalid rule id")?;
        if RuleQueries::get_by_id(&self.db, rule_id).await?.is_none() {
            return Err(anyhow!("Rule {} does not exist", rule_id));
        }

        let app = ManagedApp { package_id: package_id.to_string(), rule_id };
        ManagedAppQueries::upsert(&self.db, &app).await?;
        info!("Package {} now governed by rule {}", package_id, rule_id);

        self.coordinator.on_app_bound(package_id).await
    }

    async fn unbind_app(&self, package_id: &str) -> Result<bool> {
        let canceled = self.registry.cancel(package_id).await?;
        ManagedAppQueries::delete(&self.db, package_id).await?;
        info!("Package {} is no longer managed", package_id);
        Ok(canceled)
    }
}

fn error_reply(e: &anyhow::Error) -> String {
    json!({ "error": format!("{:#}", e) }).to_string()
}

fn summary_reply(summary: &ReconcileSummary) -> String {
    serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
}

#[interface(name = "org.dots.FocusDaemon")]
impl FocusDaemonService {
    async fn submit_notification(&self, package_id: &str, title: &str, content: &str) -> String {
        let notification = AppNotification::new(package_id, title, content);

        let result = self
            .enforcer
            .enforce(&notification, |held| {
                debug!("Withdrawing notification '{}' from {}", held.title, held.package_id);
            })
            .await;

        match result {
            Ok(decision) => serde_json::to_string(&decision).unwrap_or_else(|_| "{}".to_string()),
            Err(e) => {
                warn!("Failed to enforce notification from {}: {}", package_id, e);
                error_reply(&anyhow!(e))
            }
        }
    }

    async fn check_blocked(&self, package_id: &str) -> zbus::fdo::Result<bool> {
        match self.enforcer.decide(package_id).await {
            Ok(decision) => Ok(decision.is_suppressed()),
            Err(e) => {
                warn!("Failed to check {}: {}", package_id, e);
                Err(zbus::fdo::Error::Failed(e.to_string()))
            }
        }
    }

    async fn put_rule(&self, rule_json: &str) -> String {
        match self.store_rule(rule_json).await {
            Ok(summary) => summary_reply(&summary),
            Err(e) => {
                warn!("Failed to store rule: {:#}", e);
                error_reply(&e)
            }
        }
    }

    async fn delete_rule(&self, rule_id: &str) -> String {
        match self.remove_rule(rule_id).await {
            Ok(summary) => summary_reply(&summary),
            Err(e) => {
                warn!("Failed to delete rule {}: {:#}", rule_id, e);
                error_reply(&e)
            }
        }
    }

    async fn manage_app(&self, package_id: &str, rule_id: &str) -> String {
        match self.bind_app(package_id, rule_id).await {
            Ok(summary) => summary_reply(&summary),
            Err(e) => {
                warn!("Failed to manage {}: {:#}", package_id, e);
                error_reply(&e)
            }
        }
    }

    async fn unmanage_app(&self, package_id: &str) -> String {
        match self.unbind_app(package_id).await {
            Ok(canceled) => json!({ "canceled_report": canceled }).to_string(),
            Err(e) => {
                warn!("Failed to unmanage {}: {:#}", package_id, e);
                error_reply(&e)
            }
        }
    }

    async fn list_scheduled(&self) -> String {
        match self.registry.entries().await {
            Ok(entries) => serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string()),
            Err(e) => {
                warn!("Failed to list scheduled reports: {:#}", e);
                error_reply(&e)
            }
        }
    }

    #[zbus(signal)]
    async fn report_ready(
        signal_ctxt: &zbus::SignalContext<'_>,
        package_id: &str,
    ) -> zbus::Result<()>;
}
