//! Post fan-out
//!
//! For every new post: update the feed cache of each follower (bounded by
//! the fan-out limit), then publish one routed message per instance holding a
//! live session for that follower. Cache work and push delivery are
//! independent, and a failure for one follower never stops the others.

mod worker;

pub use worker::{run_fanout_worker, FanoutQueue};

use crate::broker::{Delivery, FeedBroker};
use crate::cache::{CachePolicy, FeedCacheStore};
use crate::config::FeedSettings;
use crate::error::{FeedError, Result};
use crate::metrics;
use crate::models::{FeedItem, RoutedMessage};
use crate::registry::SubscriberRegistry;
use crate::store::PostStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to one fanned-out post
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub subscribers: usize,
    /// Warm caches updated in place
    pub pushed: usize,
    /// Cold caches rebuilt from the store
    pub rebuilt: usize,
    pub cache_failures: usize,
    pub published: usize,
    pub delivery_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheOutcome {
    Pushed,
    Rebuilt,
}

pub struct FanoutCoordinator {
    store: Arc<dyn PostStore>,
    cache: Arc<dyn FeedCacheStore>,
    registry: Arc<dyn SubscriberRegistry>,
    /// `None` disables real-time push; cache updates still happen
    broker: Option<Arc<dyn FeedBroker>>,
    settings: FeedSettings,
}

impl FanoutCoordinator {
    pub fn new(
        store: Arc<dyn PostStore>,
        cache: Arc<dyn FeedCacheStore>,
        registry: Arc<dyn SubscriberRegistry>,
        broker: Option<Arc<dyn FeedBroker>>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            broker,
            settings,
        }
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::new(self.settings.cache_capacity, self.settings.cache_ttl())
    }

    /// Fan out an already-committed post.
    ///
    /// Errors only when the post or its follower list cannot be loaded;
    /// per-follower failures are logged and counted in the report.
    pub async fn fan_out(&self, post_id: Uuid) -> Result<FanoutReport> {
        let item = self
            .store
            .post_by_id(post_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("post {}", post_id)))?;

        let subscribers = self
            .store
            .followers_of(item.author_id, self.settings.fanout_limit)
            .await?;

        let mut report = FanoutReport {
            subscribers: subscribers.len(),
            ..Default::default()
        };

        for subscriber_id in subscribers {
            match self.update_cache(subscriber_id, &item).await {
                Ok(CacheOutcome::Pushed) => {
                    report.pushed += 1;
                    metrics::record_fanout_subscriber("pushed");
                }
                Ok(CacheOutcome::Rebuilt) => {
                    report.rebuilt += 1;
                    metrics::record_fanout_subscriber("rebuilt");
                }
                Err(e) => {
                    report.cache_failures += 1;
                    metrics::record_fanout_subscriber("failed");
                    warn!(
                        post_id = %post_id,
                        subscriber_id = %subscriber_id,
                        error = %e,
                        "Feed cache update failed, skipping subscriber"
                    );
                }
            }

            let (published, failed) = self.deliver(subscriber_id, &item).await;
            report.published += published;
            report.delivery_failures += failed;
        }

        info!(
            post_id = %post_id,
            author_id = %item.author_id,
            subscribers = report.subscribers,
            pushed = report.pushed,
            rebuilt = report.rebuilt,
            cache_failures = report.cache_failures,
            published = report.published,
            "Fan-out complete"
        );
        Ok(report)
    }

    async fn update_cache(&self, subscriber_id: Uuid, item: &FeedItem) -> Result<CacheOutcome> {
        let policy = self.policy();
        if self.cache.push_front(subscriber_id, item, policy).await? {
            return Ok(CacheOutcome::Pushed);
        }

        // Cold: fill from the store of record, never from the single new item
        let items = self
            .store
            .friends_feed(subscriber_id, policy.capacity)
            .await?;
        self.cache.rebuild(subscriber_id, &items, policy).await?;
        metrics::record_cache_rebuild("fanout");
        Ok(CacheOutcome::Rebuilt)
    }

    /// Publish to every instance with a live session for `subscriber_id`.
    /// Returns `(published, failed)`.
    async fn deliver(&self, subscriber_id: Uuid, item: &FeedItem) -> (usize, usize) {
        let Some(broker) = &self.broker else {
            return (0, 0);
        };

        let instances = match self.registry.instances_for(subscriber_id).await {
            Ok(instances) => instances,
            Err(e) => {
                metrics::record_push_published("lookup_failed");
                warn!(subscriber_id = %subscriber_id, error = %e, "Registry lookup failed, skipping push");
                return (0, 1);
            }
        };
        if instances.is_empty() {
            debug!(subscriber_id = %subscriber_id, "No live sessions, skipping push");
            return (0, 0);
        }

        let delivery = match Delivery::routed(&RoutedMessage::new(item.clone(), subscriber_id)) {
            Ok(d) => d,
            Err(e) => {
                warn!(subscriber_id = %subscriber_id, error = %e, "Failed to encode routed message");
                return (0, 1);
            }
        };

        let (mut published, mut failed) = (0, 0);
        for instance_id in &instances {
            match broker.publish(instance_id, delivery.clone()).await {
                Ok(()) => {
                    published += 1;
                    metrics::record_push_published("ok");
                }
                Err(e) => {
                    failed += 1;
                    metrics::record_push_published("error");
                    warn!(
                        subscriber_id = %subscriber_id,
                        instance_id = %instance_id,
                        error = %e,
                        "Publish failed"
                    );
                }
            }
        }
        (published, failed)
    }
}
