//! Per-subscriber feed cache
//!
//! Each subscriber owns one bounded, most-recent-first list of feed items that
//! expires after a TTL. An absent entry ("cold") is a different state from an
//! entry holding zero items: cold entries are only ever filled by `rebuild`
//! from the database of record, never by a single pushed item.
//!
//! Keys:
//! - `feed:{subscriber_id}` → list of JSON feed items
//! - `feed:{subscriber_id}:built` → presence marker, same TTL as the list

mod memory;
mod redis_store;

pub use memory::InMemoryFeedCache;
pub use redis_store::RedisFeedCache;

use crate::error::Result;
use crate::models::FeedItem;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Size bound and expiry applied on every mutating cache operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub capacity: usize,
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }

    /// TTL in whole seconds, never below one
    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
pub trait FeedCacheStore: Send + Sync {
    /// Atomically replace the entry with `items` (newest first), capped to
    /// `policy.capacity`, and reset its TTL. An empty slice leaves a warm, empty entry.
    async fn rebuild(&self, subscriber_id: Uuid, items: &[FeedItem], policy: CachePolicy)
        -> Result<()>;

    /// Prepend `item`, trim to capacity and refresh the TTL in one step.
    ///
    /// Returns `false` without touching anything when the entry is cold.
    async fn push_front(
        &self,
        subscriber_id: Uuid,
        item: &FeedItem,
        policy: CachePolicy,
    ) -> Result<bool>;

    /// Cached items newest first, or `None` when the entry is cold
    async fn read(&self, subscriber_id: Uuid) -> Result<Option<Vec<FeedItem>>>;
}

pub fn feed_key(subscriber_id: Uuid) -> String {
    format!("feed:{}", subscriber_id)
}

pub fn built_marker_key(subscriber_id: Uuid) -> String {
    format!("feed:{}:built", subscriber_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        let id = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        assert_eq!(feed_key(id), "feed:00000000-0000-0000-0000-000000000001");
        assert_eq!(
            built_marker_key(id),
            "feed:00000000-0000-0000-0000-000000000001:built"
        );
    }

    #[test]
    fn test_ttl_secs_never_zero() {
        let policy = CachePolicy::new(3, Duration::from_millis(200));
        assert_eq!(policy.ttl_secs(), 1);
        assert_eq!(CachePolicy::new(3, Duration::from_secs(300)).ttl_secs(), 300);
    }
}
