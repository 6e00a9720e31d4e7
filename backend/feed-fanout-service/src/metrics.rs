//! Fan-out and delivery metrics
//!
//! Prometheus counters for the cache update path and the push path

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

static FANOUT_SUBSCRIBERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_subscribers_total",
        "Per-subscriber cache updates performed by fan-out (pushed/rebuilt/failed)",
        &["outcome"]
    )
    .expect("Failed to register fan-out subscribers metric")
});

static CACHE_REBUILDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_cache_rebuilds_total",
        "Feed cache rebuilds from the database of record",
        &["reason"]
    )
    .expect("Failed to register cache rebuilds metric")
});

static PUSH_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_push_published_total",
        "Routed messages published to the broker",
        &["status"]
    )
    .expect("Failed to register push published metric")
});

static PUSH_DELIVERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_push_delivered_total",
        "Routed messages consumed by this instance (delivered/dropped/rejected)",
        &["result"]
    )
    .expect("Failed to register push delivered metric")
});

static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "feed_live_connections",
        "Live feed sessions attached to this instance"
    )
    .expect("Failed to register live connections metric")
});

pub fn record_fanout_subscriber(outcome: &str) {
    FANOUT_SUBSCRIBERS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_cache_rebuild(reason: &str) {
    CACHE_REBUILDS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_push_published(status: &str) {
    PUSH_PUBLISHED_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_push_delivery(result: &str) {
    PUSH_DELIVERED_TOTAL.with_label_values(&[result]).inc();
}

pub fn set_live_connections(count: usize) {
    LIVE_CONNECTIONS.set(count as i64);
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
