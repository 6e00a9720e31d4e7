//! Which instances hold a live session for a subscriber.
//!
//! A registration is one `(subscriber, connection, instance)` triple with its
//! own expiry. Sessions refresh it on every heartbeat, so a crashed instance
//! stops being targeted once its registrations lapse.

mod memory;
mod redis_store;

pub use memory::InMemorySubscriberRegistry;
pub use redis_store::RedisSubscriberRegistry;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Add or refresh a registration; expires `ttl` from now unless refreshed
    async fn register(
        &self,
        subscriber_id: Uuid,
        connection_id: Uuid,
        instance_id: &str,
        ttl: Duration,
    ) -> Result<()>;

    /// Idempotent
    async fn unregister(
        &self,
        subscriber_id: Uuid,
        connection_id: Uuid,
        instance_id: &str,
    ) -> Result<()>;

    /// Distinct instances with at least one unexpired registration, sorted
    async fn instances_for(&self, subscriber_id: Uuid) -> Result<Vec<String>>;
}

pub fn instances_key(subscriber_id: Uuid) -> String {
    format!("instances:{}", subscriber_id)
}

/// Sorted-set member for one connection: `{connection_id}@{instance_id}`
pub(crate) fn registration_member(connection_id: Uuid, instance_id: &str) -> String {
    format!("{}@{}", connection_id, instance_id)
}

pub(crate) fn instance_of_member(member: &str) -> Option<&str> {
    member
        .split_once('@')
        .map(|(_, instance)| instance)
        .filter(|instance| !instance.is_empty())
}
