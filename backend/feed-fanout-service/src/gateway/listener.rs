use super::DeliveryGateway;
use crate::broker::FeedBroker;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

/// Consume routed messages addressed to this instance and hand them to the
/// gateway. Resubscribes with backoff if the broker drops the subscription;
/// returns once shutdown is signalled.
pub async fn run_delivery_listener(
    gateway: DeliveryGateway,
    broker: Arc<dyn FeedBroker>,
    mut shutdown: watch::Receiver<bool>,
) {
    let routing_key = gateway.instance_id().to_string();
    let mut delay = RESUBSCRIBE_DELAY;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let mut stream = match broker.subscribe(&routing_key).await {
            Ok(stream) => {
                info!(routing_key = %routing_key, "Delivery listener subscribed");
                delay = RESUBSCRIBE_DELAY;
                stream
            }
            Err(e) => {
                error!(routing_key = %routing_key, error = %e, "Broker subscribe failed, real-time push paused");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(MAX_RESUBSCRIBE_DELAY);
                continue;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(routing_key = %routing_key, "Delivery listener stopped");
                    return;
                }
                next = stream.next() => match next {
                    Some(delivery) => {
                        gateway.handle_delivery(&delivery).await;
                    }
                    None => {
                        warn!(routing_key = %routing_key, "Broker subscription ended, resubscribing");
                        break;
                    }
                },
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!(routing_key = %routing_key, "Delivery listener stopped");
}
