use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dots_focus_common::Rule;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::ports::RuleLookup;

pub const DEFAULT_RULE_CACHE_CAPACITY: usize = 256;

/// Read-through LRU cache in front of a [`RuleLookup`].
///
/// Owned by the daemon and shared by the enforcer and the reschedule
/// coordinator. Edits and deletes must go through [`Self::invalidate`].
pub struct CachedRuleLookup {
    inner: Arc<dyn RuleLookup>,
    cache: Mutex<LruCache<Uuid, Rule>>,
}

impl CachedRuleLookup {
    pub fn new(inner: Arc<dyn RuleLookup>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner, cache: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn invalidate(&self, rule_id: Uuid) {
        if self.cache.lock().pop(&rule_id).is_some() {
            debug!("Invalidated cached rule {}", rule_id);
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RuleLookup for CachedRuleLookup {
    async fn by_id(&self, rule_id: Uuid) -> Result<Option<Rule>> {
        let cached = self.cache.lock().get(&rule_id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let rule = self.inner.by_id(rule_id).await?;
        // Misses are not cached; a rule created later must be visible at once
        if let Some(rule) = &rule {
            self.cache.lock().put(rule_id, rule.clone());
        }
        Ok(rule)
    }
}
