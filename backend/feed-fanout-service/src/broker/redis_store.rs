use super::{Delivery, DeliveryStream, FeedBroker};
use crate::error::{FeedError, Result};
use crate::metrics;
use crate::redis_conn::RedisConnection;
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Broker over Redis pub/sub.
///
/// Routing key `k` maps to channel `{topic}.{k}`; each payload is a JSON
/// envelope `{"content_type": ..., "body": ...}`. Nothing connects until the
/// first publish or subscribe, so an unreachable broker only pauses push.
#[derive(Clone)]
pub struct RedisBroker {
    publisher: RedisConnection,
    topic: String,
}

impl RedisBroker {
    pub fn new(url: &str, topic: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| FeedError::Broker(format!("invalid broker url: {}", e)))?;
        let topic = topic.into();
        info!(topic = %topic, "Broker configured");
        Ok(Self {
            publisher: RedisConnection::from_client(client),
            topic,
        })
    }

    fn channel(&self, routing_key: &str) -> String {
        format!("{}.{}", self.topic, routing_key)
    }
}

#[async_trait]
impl FeedBroker for RedisBroker {
    async fn publish(&self, routing_key: &str, delivery: Delivery) -> Result<()> {
        let channel = self.channel(routing_key);
        let payload = serde_json::to_string(&delivery)?;

        let mut conn = self
            .publisher
            .get()
            .await
            .map_err(|e| FeedError::Broker(e.to_string()))?;
        let receivers: i64 = conn
            .publish(&channel, payload)
            .await
            .map_err(|e| FeedError::Broker(e.to_string()))?;

        debug!(channel = %channel, receivers, "Published delivery");
        Ok(())
    }

    async fn subscribe(&self, routing_key: &str) -> Result<DeliveryStream> {
        let channel = self.channel(routing_key);
        let mut pubsub = self
            .publisher
            .client()
            .get_async_pubsub()
            .await
            .map_err(|e| FeedError::Broker(e.to_string()))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| FeedError::Broker(e.to_string()))?;

        info!(channel = %channel, "Subscribed to deliveries");

        // The pub/sub connection lives in the forwarder; dropping the
        // returned stream closes the channel and ends the subscription.
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            loop {
                let msg = tokio::select! {
                    _ = tx.closed() => break,
                    msg = messages.next() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };

                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "Failed to read broker payload");
                        continue;
                    }
                };
                match serde_json::from_str::<Delivery>(&payload) {
                    Ok(delivery) => {
                        if tx.send(delivery).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed broker envelope");
                        metrics::record_push_delivery("rejected");
                    }
                }
            }
            debug!(channel = %channel, "Broker subscription closed");
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
