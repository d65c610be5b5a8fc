use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dots_focus_common::{AppNotification, ManagedApp, Rule};
use dots_focus_db::queries::{KeyValueQueries, ManagedAppQueries, NotificationQueries, RuleQueries};
use dots_focus_db::Database;
use uuid::Uuid;

use crate::ports::{ManagedAppLookup, NotificationHistoryStore, PersistentKeyValueStore, RuleLookup};

/// Collaborators backed by the SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ManagedAppLookup for SqliteStore {
    async fn by_package_id(&self, package_id: &str) -> Result<Option<ManagedApp>> {
        ManagedAppQueries::get_by_package(&self.db, package_id)
            .await
            .with_context(|| format!("Failed to look up managed app {}", package_id))
    }

    async fn by_rule_id(&self, rule_id: Uuid) -> Result<Vec<ManagedApp>> {
        ManagedAppQueries::list_by_rule(&self.db, rule_id)
            .await
            .with_context(|| format!("Failed to list apps bound to rule {}", rule_id))
    }
}

#[async_trait]
impl RuleLookup for SqliteStore {
    async fn by_id(&self, rule_id: Uuid) -> Result<Option<Rule>> {
        RuleQueries::get_by_id(&self.db, rule_id)
            .await
            .with_context(|| format!("Failed to load rule {}", rule_id))
    }
}

#[async_trait]
impl NotificationHistoryStore for SqliteStore {
    async fn insert(&self, notification: &AppNotification) -> Result<()> {
        NotificationQueries::insert(&self.db, notification)
            .await
            .context("Failed to record notification")?;
        Ok(())
    }
}

#[async_trait]
impl PersistentKeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(KeyValueQueries::get(&self.db, key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        Ok(KeyValueQueries::set(&self.db, key, value).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(KeyValueQueries::delete(&self.db, key).await?)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(KeyValueQueries::keys_with_prefix(&self.db, prefix).await?)
    }
}
