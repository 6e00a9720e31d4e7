use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

/// Identity of one live session, unique across instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct LocalConnection {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

/// Live sessions attached to this instance, keyed by subscriber.
///
/// Owned by one gateway; never shared between instances.
#[derive(Default, Clone)]
pub struct LocalConnections {
    inner: Arc<RwLock<HashMap<Uuid, Vec<LocalConnection>>>>,
}

impl LocalConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, subscriber_id: Uuid) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard
            .entry(subscriber_id)
            .or_default()
            .push(LocalConnection { id, sender: tx });

        tracing::debug!(
            subscriber_id = %subscriber_id,
            connection_id = %id,
            local = guard.get(&subscriber_id).map(|v| v.len()).unwrap_or(0),
            "Attached local connection"
        );
        (id, rx)
    }

    /// Returns whether the connection was present
    pub async fn remove(&self, subscriber_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(&subscriber_id) else {
            return false;
        };

        let before = connections.len();
        connections.retain(|c| c.id != connection_id);
        let removed = connections.len() != before;

        if connections.is_empty() {
            guard.remove(&subscriber_id);
        }
        removed
    }

    /// Send to every local connection of `subscriber_id`, pruning closed ones.
    /// Returns how many connections accepted the message.
    pub async fn push(&self, subscriber_id: Uuid, msg: String) -> usize {
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(&subscriber_id) else {
            return 0;
        };

        let before = connections.len();
        connections.retain(|c| c.sender.send(msg.clone()).is_ok());
        let delivered = connections.len();

        if delivered != before {
            tracing::debug!(
                subscriber_id = %subscriber_id,
                pruned = before - delivered,
                "Pruned closed local connections"
            );
        }
        if connections.is_empty() {
            guard.remove(&subscriber_id);
        }
        delivered
    }

    pub async fn contains(&self, subscriber_id: Uuid, connection_id: ConnectionId) -> bool {
        let guard = self.inner.read().await;
        guard
            .get(&subscriber_id)
            .is_some_and(|connections| connections.iter().any(|c| c.id == connection_id))
    }

    pub async fn connection_count(&self, subscriber_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&subscriber_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn total(&self) -> usize {
        self.inner.read().await.values().map(Vec::len).sum()
    }
}
