//! Message broker between fan-out and the instances holding live sessions.
//!
//! Every instance consumes from its own routing key (its instance id); the
//! fan-out side publishes one delivery per target instance. Delivery is
//! at-most-once: nothing is buffered for an instance that is not consuming.

mod memory;
mod redis_store;

pub use memory::InMemoryBroker;
pub use redis_store::RedisBroker;

use crate::error::{FeedError, Result};
use crate::models::RoutedMessage;
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// One message as carried by the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub content_type: String,
    pub body: String,
}

impl Delivery {
    pub fn routed(message: &RoutedMessage) -> Result<Self> {
        Ok(Self {
            content_type: CONTENT_TYPE_JSON.to_string(),
            body: serde_json::to_string(message)?,
        })
    }

    /// Decode a routed message, rejecting anything not declared as JSON
    pub fn decode_routed(&self) -> Result<RoutedMessage> {
        let declared = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if !declared.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
            return Err(FeedError::InvalidInput(format!(
                "unsupported content type {:?}",
                self.content_type
            )));
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

#[async_trait]
pub trait FeedBroker: Send + Sync {
    async fn publish(&self, routing_key: &str, delivery: Delivery) -> Result<()>;

    /// Consume deliveries for `routing_key` until the stream is dropped
    async fn subscribe(&self, routing_key: &str) -> Result<DeliveryStream>;
}
