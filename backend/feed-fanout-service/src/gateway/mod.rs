//! Per-instance delivery of routed feed messages to live sessions.
//!
//! The gateway owns this instance's local connection map and keeps the
//! shared subscriber registry in step with it. Routed messages arrive from
//! the broker addressed to this instance only; a message for a subscriber
//! with no local connection is dropped.

mod connections;
mod listener;
pub mod messages;

pub use connections::{ConnectionId, LocalConnections};
pub use listener::run_delivery_listener;
pub use messages::{InboundMessage, OutboundMessage};

use crate::broker::Delivery;
use crate::metrics;
use crate::models::RoutedMessage;
use crate::registry::SubscriberRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the transport holds for one attached session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub subscriber_id: Uuid,
    pub connection_id: ConnectionId,
}

#[derive(Clone)]
pub struct DeliveryGateway {
    instance_id: Arc<str>,
    connections: LocalConnections,
    registry: Arc<dyn SubscriberRegistry>,
    registration_ttl: Duration,
}

impl DeliveryGateway {
    pub fn new(
        instance_id: impl Into<Arc<str>>,
        registry: Arc<dyn SubscriberRegistry>,
        registration_ttl: Duration,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            connections: LocalConnections::new(),
            registry,
            registration_ttl,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Attach a new live session. Frames for it arrive on the returned receiver.
    ///
    /// A registry failure is logged, not returned: the session still works
    /// locally and the next heartbeat retries the registration.
    pub async fn attach(&self, subscriber_id: Uuid) -> (ConnectionHandle, UnboundedReceiver<String>) {
        let (connection_id, rx) = self.connections.add(subscriber_id).await;
        let handle = ConnectionHandle {
            subscriber_id,
            connection_id,
        };

        self.heartbeat(&handle).await;
        metrics::set_live_connections(self.connections.total().await);

        info!(
            subscriber_id = %subscriber_id,
            connection_id = %connection_id,
            instance_id = %self.instance_id,
            "Live session attached"
        );
        (handle, rx)
    }

    /// Idempotent
    pub async fn detach(&self, handle: &ConnectionHandle) {
        let removed = self
            .connections
            .remove(handle.subscriber_id, handle.connection_id)
            .await;

        self.unregister(handle).await;

        if removed {
            metrics::set_live_connections(self.connections.total().await);
            info!(
                subscriber_id = %handle.subscriber_id,
                connection_id = %handle.connection_id,
                "Live session detached"
            );
        }
    }

    /// Refresh the session's registration.
    ///
    /// No-op once the session is detached. A detach that lands while the
    /// refresh is in flight is undone by unregistering again.
    pub async fn heartbeat(&self, handle: &ConnectionHandle) {
        if !self.is_attached(handle).await {
            debug!(
                subscriber_id = %handle.subscriber_id,
                connection_id = %handle.connection_id,
                "Skipping heartbeat for detached session"
            );
            return;
        }

        if let Err(e) = self
            .registry
            .register(
                handle.subscriber_id,
                handle.connection_id.as_uuid(),
                &self.instance_id,
                self.registration_ttl,
            )
            .await
        {
            warn!(
                subscriber_id = %handle.subscriber_id,
                connection_id = %handle.connection_id,
                error = %e,
                "Failed to refresh session registration"
            );
            return;
        }

        if !self.is_attached(handle).await {
            self.unregister(handle).await;
        }
    }

    async fn is_attached(&self, handle: &ConnectionHandle) -> bool {
        self.connections
            .contains(handle.subscriber_id, handle.connection_id)
            .await
    }

    async fn unregister(&self, handle: &ConnectionHandle) {
        if let Err(e) = self
            .registry
            .unregister(
                handle.subscriber_id,
                handle.connection_id.as_uuid(),
                &self.instance_id,
            )
            .await
        {
            // The registration lapses on its own once the TTL passes
            warn!(
                subscriber_id = %handle.subscriber_id,
                connection_id = %handle.connection_id,
                error = %e,
                "Failed to unregister live session"
            );
        }
    }

    /// Handle one text frame from the client. Returns the reply to send, if any.
    pub async fn handle_inbound(&self, handle: &ConnectionHandle, text: &str) -> Option<String> {
        match InboundMessage::parse(text) {
            InboundMessage::Keepalive => {
                self.heartbeat(handle).await;
                None
            }
            InboundMessage::Other(payload) => {
                let reply = OutboundMessage::Echo {
                    instance_id: self.instance_id.to_string(),
                    connection_id: handle.connection_id.as_uuid(),
                    payload,
                };
                match reply.to_text() {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!(error = %e, "Failed to encode echo frame");
                        None
                    }
                }
            }
        }
    }

    /// Push a routed message to every local session of its subscriber.
    /// Returns the number of sessions reached.
    pub async fn deliver(&self, message: RoutedMessage) -> usize {
        let subscriber_id = message.subscriber_id;
        let frame = match (OutboundMessage::Post { post: message.item }).to_text() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(subscriber_id = %subscriber_id, error = %e, "Failed to encode push frame");
                return 0;
            }
        };

        let reached = self.connections.push(subscriber_id, frame).await;
        if reached == 0 {
            metrics::record_push_delivery("dropped");
            debug!(subscriber_id = %subscriber_id, "No local session for routed message, dropping");
        } else {
            metrics::record_push_delivery("delivered");
        }
        reached
    }

    /// Decode a broker delivery and push it. Undecodable deliveries are dropped.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> usize {
        match delivery.decode_routed() {
            Ok(message) => self.deliver(message).await,
            Err(e) => {
                metrics::record_push_delivery("rejected");
                warn!(
                    content_type = %delivery.content_type,
                    error = %e,
                    "Rejected routed delivery"
                );
                0
            }
        }
    }

    pub async fn local_connection_count(&self, subscriber_id: Uuid) -> usize {
        self.connections.connection_count(subscriber_id).await
    }
}
