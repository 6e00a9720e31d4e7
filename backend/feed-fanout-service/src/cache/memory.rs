use super::{CachePolicy, FeedCacheStore};
use crate::error::Result;
use crate::models::FeedItem;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

struct CacheEntry {
    items: VecDeque<FeedItem>,
    expires_at: Instant,
}

/// Process-local feed cache for single-node runs and tests
///
/// Same semantics as the Redis backend: expiry is checked lazily on access.
#[derive(Default, Clone)]
pub struct InMemoryFeedCache {
    entries: Arc<Mutex<HashMap<Uuid, CacheEntry>>>,
}

impl InMemoryFeedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedCacheStore for InMemoryFeedCache {
    async fn rebuild(
        &self,
        subscriber_id: Uuid,
        items: &[FeedItem],
        policy: CachePolicy,
    ) -> Result<()> {
        let entry = CacheEntry {
            items: items.iter().take(policy.capacity).cloned().collect(),
            expires_at: Instant::now() + policy.ttl,
        };
        self.entries.lock().await.insert(subscriber_id, entry);
        Ok(())
    }

    async fn push_front(
        &self,
        subscriber_id: Uuid,
        item: &FeedItem,
        policy: CachePolicy,
    ) -> Result<bool> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();

        match guard.get_mut(&subscriber_id) {
            Some(entry) if entry.expires_at > now => {
                entry.items.push_front(item.clone());
                entry.items.truncate(policy.capacity);
                entry.expires_at = now + policy.ttl;
                Ok(true)
            }
            Some(_) => {
                guard.remove(&subscriber_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn read(&self, subscriber_id: Uuid) -> Result<Option<Vec<FeedItem>>> {
        let mut guard = self.entries.lock().await;
        match guard.get(&subscriber_id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                Ok(Some(entry.items.iter().cloned().collect()))
            }
            Some(_) => {
                guard.remove(&subscriber_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
