//! Redis-backed cache, registry and broker.
//!
//! Needs a live Redis: `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`

use chrono::{Duration as ChronoDuration, Utc};
use feed_fanout::broker::{Delivery, FeedBroker, RedisBroker};
use feed_fanout::cache::{CachePolicy, FeedCacheStore, RedisFeedCache};
use feed_fanout::models::{FeedItem, RoutedMessage};
use feed_fanout::redis_conn::RedisConnection;
use feed_fanout::registry::{RedisSubscriberRegistry, SubscriberRegistry};
use futures_util::StreamExt;
use std::time::Duration;
use uuid::Uuid;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn connection() -> RedisConnection {
    RedisConnection::open(&redis_url()).unwrap()
}

fn item(n: i64) -> FeedItem {
    FeedItem {
        id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
        author_name: "Friend".into(),
        text: format!("p{}", n),
        created_at: Utc::now() + ChronoDuration::seconds(n),
        updated_at: None,
    }
}

#[tokio::test]
#[ignore]
async fn redis_cache_distinguishes_cold_from_empty() {
    let cache = RedisFeedCache::new(connection());
    let user = Uuid::new_v4();
    let policy = CachePolicy::new(3, Duration::from_secs(60));

    assert_eq!(cache.read(user).await.unwrap(), None);
    assert!(!cache.push_front(user, &item(1), policy).await.unwrap());
    assert_eq!(cache.read(user).await.unwrap(), None);

    cache.rebuild(user, &[], policy).await.unwrap();
    assert_eq!(cache.read(user).await.unwrap(), Some(vec![]));
}

#[tokio::test]
#[ignore]
async fn redis_cache_push_front_trims_to_capacity() {
    let cache = RedisFeedCache::new(connection());
    let user = Uuid::new_v4();
    let policy = CachePolicy::new(3, Duration::from_secs(60));
    let (p1, p2, p3, p4) = (item(1), item(2), item(3), item(4));

    cache
        .rebuild(user, &[p3.clone(), p2.clone(), p1], policy)
        .await
        .unwrap();
    assert!(cache.push_front(user, &p4, policy).await.unwrap());

    assert_eq!(cache.read(user).await.unwrap().unwrap(), vec![p4, p3, p2]);
}

#[tokio::test]
#[ignore]
async fn redis_registry_expires_and_unregisters() {
    let registry = RedisSubscriberRegistry::new(connection());
    let user = Uuid::new_v4();
    let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());

    registry
        .register(user, c1, "a", Duration::from_millis(500))
        .await
        .unwrap();
    registry
        .register(user, c2, "b", Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(registry.instances_for(user).await.unwrap(), vec!["a", "b"]);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(registry.instances_for(user).await.unwrap(), vec!["b"]);

    registry.unregister(user, c2, "b").await.unwrap();
    registry.unregister(user, c2, "b").await.unwrap();
    assert!(registry.instances_for(user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn redis_broker_routes_by_instance() {
    let topic = format!("feed-test-{}", Uuid::new_v4().simple());
    let broker = RedisBroker::new(&redis_url(), topic).unwrap();
    let mut mine = broker.subscribe("a").await.unwrap();

    let message = RoutedMessage::new(item(1), Uuid::new_v4());
    broker
        .publish("b", Delivery::routed(&message).unwrap())
        .await
        .unwrap();
    broker
        .publish("a", Delivery::routed(&message).unwrap())
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), mine.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.decode_routed().unwrap(), message);
}
