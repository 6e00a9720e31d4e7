use super::SubscriberRegistry;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

type Registrations = HashMap<(Uuid, String), Instant>;

/// Process-local registry. Shared between gateways in tests to stand in for Redis.
#[derive(Default, Clone)]
pub struct InMemorySubscriberRegistry {
    entries: Arc<Mutex<HashMap<Uuid, Registrations>>>,
}

impl InMemorySubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberRegistry for InMemorySubscriberRegistry {
    async fn register(
        &self,
        subscriber_id: Uuid,
        connection_id: Uuid,
        instance_id: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.entries
            .lock()
            .await
            .entry(subscriber_id)
            .or_default()
            .insert((connection_id, instance_id.to_string()), Instant::now() + ttl);
        Ok(())
    }

    async fn unregister(
        &self,
        subscriber_id: Uuid,
        connection_id: Uuid,
        instance_id: &str,
    ) -> Result<()> {
        let mut guard = self.entries.lock().await;
        if let Some(regs) = guard.get_mut(&subscriber_id) {
            regs.remove(&(connection_id, instance_id.to_string()));
            if regs.is_empty() {
                guard.remove(&subscriber_id);
            }
        }
        Ok(())
    }

    async fn instances_for(&self, subscriber_id: Uuid) -> Result<Vec<String>> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();

        let Some(regs) = guard.get_mut(&subscriber_id) else {
            return Ok(Vec::new());
        };
        regs.retain(|_, expires_at| *expires_at > now);

        let instances: BTreeSet<String> =
            regs.keys().map(|(_, instance)| instance.clone()).collect();
        if regs.is_empty() {
            guard.remove(&subscriber_id);
        }
        Ok(instances.into_iter().collect())
    }
}
