// Rule Enforcer
//
// Per-notification flow: find the rule governing the package, decide whether
// it blocks right now and, if so, hold the notification back and make sure a
// deferred report alarm is pending for when the rule stops blocking.

use std::sync::Arc;

use chrono::Utc;
use dots_focus_common::{
    AppNotification, BlockDecisionEngine, EnforcementDecision, NextTransition, Rule,
    TransitionCalculator,
};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::ports::{Clock, ManagedAppLookup, NotificationHistoryStore, RuleLookup};
use crate::schedule_registry::AlarmScheduleRegistry;

#[derive(Error, Debug)]
pub enum EnforceError {
    /// A managed app points at a rule that does not exist.
    #[error("Managed app {package_id} references missing rule {rule_id}")]
    InvariantViolation { package_id: String, rule_id: Uuid },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub(crate) enum Resolution {
    Unmanaged,
    Governed(Rule),
}

/// Looks up the app binding and its rule. A binding to a missing rule is an
/// invariant violation and is logged as such.
pub(crate) async fn resolve(
    apps: &dyn ManagedAppLookup,
    rules: &dyn RuleLookup,
    package_id: &str,
) -> Result<Resolution, EnforceError> {
    let Some(app) = apps.by_package_id(package_id).await? else {
        return Ok(Resolution::Unmanaged);
    };

    match rules.by_id(app.rule_id).await? {
        Some(rule) => Ok(Resolution::Governed(rule)),
        None => {
            error!("Managed app {} references missing rule {}", app.package_id, app.rule_id);
            Err(EnforceError::InvariantViolation { package_id: app.package_id, rule_id: app.rule_id })
        }
    }
}

pub struct RuleEnforcer {
    apps: Arc<dyn ManagedAppLookup>,
    rules: Arc<dyn RuleLookup>,
    history: Arc<dyn NotificationHistoryStore>,
    registry: Arc<AlarmScheduleRegistry>,
    clock: Arc<dyn Clock>,
}

impl RuleEnforcer {
    pub fn new(
        apps: Arc<dyn ManagedAppLookup>,
        rules: Arc<dyn RuleLookup>,
        history: Arc<dyn NotificationHistoryStore>,
        registry: Arc<AlarmScheduleRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { apps, rules, history, registry, clock }
    }

    /// Applies the package's rule to one incoming notification.
    ///
    /// When the rule blocks, `on_suppress` is called with the notification
    /// before it is written to history, and a report alarm is ensured for the
    /// next transition. When it allows, a leftover alarm for the package is
    /// canceled.
    pub async fn enforce<F>(
        &self,
        notification: &AppNotification,
        on_suppress: F,
    ) -> Result<EnforcementDecision, EnforceError>
    where
        F: FnOnce(&AppNotification) + Send,
    {
        let package_id = notification.package_id.as_str();
        let now = self.clock.now();

        let rule = match resolve(self.apps.as_ref(), self.rules.as_ref(), package_id).await? {
            Resolution::Unmanaged => {
                debug!("Notification from unmanaged package {}", package_id);
                return Ok(EnforcementDecision::Unmanaged);
            }
            Resolution::Governed(rule) => rule,
        };

        if !BlockDecisionEngine::is_blocked(&rule, &now) {
            if self.registry.cancel(package_id).await? {
                info!("Rule '{}' no longer blocks {}, dropped pending report", rule.name, package_id);
            }
            return Ok(EnforcementDecision::Allow);
        }

        on_suppress(notification);
        self.history.insert(notification).await?;

        let next = TransitionCalculator::next_transition(&rule, &now);
        match next {
            NextTransition::At(target) => {
                self.registry.ensure_scheduled(package_id, target, now.with_timezone(&Utc)).await?;
            }
            NextTransition::Never => {
                debug!("Rule '{}' never unblocks, no report scheduled for {}", rule.name, package_id);
            }
        }

        debug!("Suppressed notification from {} under rule '{}'", package_id, rule.name);
        Ok(EnforcementDecision::Suppress { next })
    }

    /// What `enforce` would decide for the package right now, without any
    /// side effects.
    pub async fn decide(&self, package_id: &str) -> Result<EnforcementDecision, EnforceError> {
        let now = self.clock.now();

        match resolve(self.apps.as_ref(), self.rules.as_ref(), package_id).await? {
            Resolution::Unmanaged => Ok(EnforcementDecision::Unmanaged),
            Resolution::Governed(rule) => {
                if BlockDecisionEngine::is_blocked(&rule, &now) {
                    Ok(EnforcementDecision::Suppress {
                        next: TransitionCalculator::next_transition(&rule, &now),
                    })
                } else {
                    Ok(EnforcementDecision::Allow)
                }
            }
        }
    }
}
