use super::{built_marker_key, feed_key, CachePolicy, FeedCacheStore};
use crate::error::Result;
use crate::models::FeedItem;
use crate::redis_conn::RedisConnection;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::Script;
use tracing::{debug, warn};
use uuid::Uuid;

// KEYS[1] = list, KEYS[2] = marker; ARGV = item json, capacity, ttl secs.
// Returns 0 and writes nothing when the entry is cold.
static PUSH_FRONT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        if redis.call('EXISTS', KEYS[2]) == 0 then
            return 0
        end
        redis.call('LPUSH', KEYS[1], ARGV[1])
        redis.call('LTRIM', KEYS[1], 0, tonumber(ARGV[2]) - 1)
        redis.call('EXPIRE', KEYS[1], ARGV[3])
        redis.call('EXPIRE', KEYS[2], ARGV[3])
        return 1
        "#,
    )
});

/// Feed cache in the shared Redis reachable by every instance
#[derive(Clone)]
pub struct RedisFeedCache {
    redis: RedisConnection,
}

impl RedisFeedCache {
    pub fn new(redis: RedisConnection) -> Self {
        Self { redis }
    }

    pub async fn ping(&self) -> Result<()> {
        self.redis.ping().await
    }
}

#[async_trait]
impl FeedCacheStore for RedisFeedCache {
    async fn rebuild(
        &self,
        subscriber_id: Uuid,
        items: &[FeedItem],
        policy: CachePolicy,
    ) -> Result<()> {
        let key = feed_key(subscriber_id);
        let marker = built_marker_key(subscriber_id);
        let ttl = policy.ttl_secs();

        let encoded = items
            .iter()
            .take(policy.capacity)
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // MULTI/EXEC: readers see either the old list or the new one
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !encoded.is_empty() {
            pipe.rpush(&key, &encoded).ignore();
            pipe.ltrim(&key, 0, policy.capacity as isize - 1).ignore();
            pipe.expire(&key, ttl as i64).ignore();
        }
        pipe.set_ex(&marker, 1, ttl).ignore();

        let mut conn = self.redis.get().await?;
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| {
                warn!(subscriber_id = %subscriber_id, error = %e, "Redis feed rebuild failed");
                e
            })?;

        debug!(
            subscriber_id = %subscriber_id,
            items = encoded.len(),
            ttl_secs = ttl,
            "Rebuilt feed cache"
        );
        Ok(())
    }

    async fn push_front(
        &self,
        subscriber_id: Uuid,
        item: &FeedItem,
        policy: CachePolicy,
    ) -> Result<bool> {
        let key = feed_key(subscriber_id);
        let marker = built_marker_key(subscriber_id);
        let json = serde_json::to_string(item)?;
        let mut conn = self.redis.get().await?;

        let applied: i64 = PUSH_FRONT_SCRIPT
            .key(&key)
            .key(&marker)
            .arg(json)
            .arg(policy.capacity)
            .arg(policy.ttl_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(subscriber_id = %subscriber_id, error = %e, "Redis feed push failed");
                e
            })?;

        Ok(applied == 1)
    }

    async fn read(&self, subscriber_id: Uuid) -> Result<Option<Vec<FeedItem>>> {
        let key = feed_key(subscriber_id);
        let marker = built_marker_key(subscriber_id);
        let mut conn = self.redis.get().await?;

        let (built, raw): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(&marker)
            .lrange(&key, 0, -1)
            .query_async(&mut conn)
            .await?;

        if !built {
            debug!("Cache miss for {}", key);
            return Ok(None);
        }

        let mut items = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<FeedItem>(&entry) {
                Ok(item) => items.push(item),
                Err(e) => {
                    // Report cold so the next rebuild overwrites the bad entry
                    warn!(subscriber_id = %subscriber_id, error = %e, "Discarding undecodable feed cache entry");
                    return Ok(None);
                }
            }
        }

        debug!("Cache hit for {} ({} items)", key, items.len());
        Ok(Some(items))
    }
}
