//! Feed read path
//!
//! Warm entries are served from the cache. A cold entry is rebuilt from the
//! store of record before it is served, the same policy fan-out applies.

use crate::cache::{CachePolicy, FeedCacheStore};
use crate::config::FeedSettings;
use crate::error::Result;
use crate::metrics;
use crate::models::FeedItem;
use crate::store::PostStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// `true` when served from a warm cache entry
    pub cached: bool,
}

#[derive(Clone)]
pub struct FeedReader {
    store: Arc<dyn PostStore>,
    cache: Arc<dyn FeedCacheStore>,
    settings: FeedSettings,
}

impl FeedReader {
    pub fn new(
        store: Arc<dyn PostStore>,
        cache: Arc<dyn FeedCacheStore>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::new(self.settings.cache_capacity, self.settings.cache_ttl())
    }

    /// First page of the subscriber's feed, newest first.
    ///
    /// A cache outage degrades to serving straight from the store; only a
    /// store failure is returned.
    pub async fn read_feed(&self, subscriber_id: Uuid) -> Result<FeedPage> {
        match self.cache.read(subscriber_id).await {
            Ok(Some(items)) => return Ok(self.page(items, true)),
            Ok(None) => {}
            Err(e) => {
                warn!(subscriber_id = %subscriber_id, error = %e, "Feed cache read failed, serving from store");
            }
        }

        let items = self.load_and_cache(subscriber_id, "read").await?;
        Ok(self.page(items, false))
    }

    /// Warm the cache if it is cold. Returns whether a rebuild happened.
    pub async fn prefetch(&self, subscriber_id: Uuid) -> Result<bool> {
        if self.cache.read(subscriber_id).await?.is_some() {
            return Ok(false);
        }

        let policy = self.policy();
        let items = self
            .store
            .friends_feed(subscriber_id, policy.capacity)
            .await?;
        self.cache.rebuild(subscriber_id, &items, policy).await?;
        metrics::record_cache_rebuild("prefetch");
        Ok(true)
    }

    /// Rebuild regardless of cache state
    pub async fn refresh(&self, subscriber_id: Uuid) -> Result<FeedPage> {
        let items = self.load_and_cache(subscriber_id, "refresh").await?;
        Ok(self.page(items, false))
    }

    fn page(&self, items: Vec<FeedItem>, cached: bool) -> FeedPage {
        FeedPage {
            items: items.into_iter().take(self.settings.page_size).collect(),
            cached,
        }
    }

    /// Load from the store and try to cache the result. The loaded items are
    /// returned even when the cache write fails.
    async fn load_and_cache(&self, subscriber_id: Uuid, reason: &str) -> Result<Vec<FeedItem>> {
        let policy = self.policy();
        let items = self
            .store
            .friends_feed(subscriber_id, policy.capacity)
            .await?;

        match self.cache.rebuild(subscriber_id, &items, policy).await {
            Ok(()) => {
                metrics::record_cache_rebuild(reason);
                debug!(subscriber_id = %subscriber_id, items = items.len(), reason, "Feed cache rebuilt");
            }
            Err(e) => {
                warn!(subscriber_id = %subscriber_id, error = %e, reason, "Feed cache rebuild failed, next read retries");
            }
        }
        Ok(items)
    }
}
