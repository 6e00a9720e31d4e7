use super::{instance_of_member, instances_key, registration_member, SubscriberRegistry};
use crate::error::Result;
use crate::redis_conn::RedisConnection;
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Registry in the shared Redis.
///
/// `instances:{subscriber_id}` is a sorted set of `{connection_id}@{instance_id}`
/// members scored by expiry time in epoch milliseconds.
#[derive(Clone)]
pub struct RedisSubscriberRegistry {
    redis: RedisConnection,
}

impl RedisSubscriberRegistry {
    pub fn new(redis: RedisConnection) -> Self {
        Self { redis }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl SubscriberRegistry for RedisSubscriberRegistry {
    async fn register(
        &self,
        subscriber_id: Uuid,
        connection_id: Uuid,
        instance_id: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = instances_key(subscriber_id);
        let member = registration_member(connection_id, instance_id);
        let expires_at = now_millis() + ttl.as_millis() as i64;
        // The whole set outlives its newest member by at most one TTL
        let key_ttl = ttl.as_secs().max(1) as i64 + 1;
        let mut conn = self.redis.get().await?;

        redis::pipe()
            .atomic()
            .zadd(&key, &member, expires_at)
            .ignore()
            .expire(&key, key_ttl)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(subscriber_id = %subscriber_id, member = %member, "Registered live session");
        Ok(())
    }

    async fn unregister(
        &self,
        subscriber_id: Uuid,
        connection_id: Uuid,
        instance_id: &str,
    ) -> Result<()> {
        let key = instances_key(subscriber_id);
        let member = registration_member(connection_id, instance_id);
        let mut conn = self.redis.get().await?;
        conn.zrem::<_, _, ()>(&key, &member).await?;
        Ok(())
    }

    async fn instances_for(&self, subscriber_id: Uuid) -> Result<Vec<String>> {
        let key = instances_key(subscriber_id);
        let mut conn = self.redis.get().await?;
        let now = now_millis();

        let (members,): (Vec<String>,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", now)
            .ignore()
            .zrangebyscore(&key, format!("({}", now), "+inf")
            .query_async(&mut conn)
            .await?;

        let instances: BTreeSet<String> = members
            .iter()
            .filter_map(|m| instance_of_member(m))
            .map(str::to_string)
            .collect();
        Ok(instances.into_iter().collect())
    }
}
