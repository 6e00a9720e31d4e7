use super::{Delivery, DeliveryStream, FeedBroker};
use crate::error::{FeedError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>,
    published: Vec<(String, Delivery)>,
}

/// Process-local broker with the same at-most-once semantics as pub/sub.
/// Also records every publish so callers can inspect routing.
#[derive(Default, Clone)]
pub struct InMemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(routing_key, delivery)` published so far, in order
    pub fn published(&self) -> Vec<(String, Delivery)> {
        self.inner
            .lock()
            .map(|inner| inner.published.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FeedBroker for InMemoryBroker {
    async fn publish(&self, routing_key: &str, delivery: Delivery) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| FeedError::Broker("broker state poisoned".into()))?;

        if let Some(senders) = inner.subscribers.get_mut(routing_key) {
            senders.retain(|tx| tx.send(delivery.clone()).is_ok());
        }
        inner.published.push((routing_key.to_string(), delivery));
        Ok(())
    }

    async fn subscribe(&self, routing_key: &str) -> Result<DeliveryStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .map_err(|_| FeedError::Broker("broker state poisoned".into()))?
            .subscribers
            .entry(routing_key.to_string())
            .or_default()
            .push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
