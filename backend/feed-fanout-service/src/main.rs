use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use feed_fanout::broker::{FeedBroker, RedisBroker};
use feed_fanout::cache::RedisFeedCache;
use feed_fanout::config::Config;
use feed_fanout::fanout::{run_fanout_worker, FanoutCoordinator, FanoutQueue};
use feed_fanout::feed::FeedReader;
use feed_fanout::gateway::{run_delivery_listener, DeliveryGateway};
use feed_fanout::redis_conn::RedisConnection;
use feed_fanout::registry::RedisSubscriberRegistry;
use feed_fanout::state::AppState;
use feed_fanout::store::PostgresPostStore;
use feed_fanout::tasks::BackgroundTasks;
use feed_fanout::{logging, routes};

const OVERFLOW_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    logging::init_tracing(&config.log);

    info!(
        instance_id = %config.app.instance_id,
        "Starting feed-fanout-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let primary = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to primary database")?;

    sqlx::migrate!("./migrations")
        .run(&primary)
        .await
        .context("Failed to run database migrations")?;

    let replica = match &config.database.ro_url {
        Some(url) => PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .context("Failed to connect to read replica")?,
        None => {
            warn!("DATABASE_RO_URL not set, feed reads will use the primary");
            primary.clone()
        }
    };
    let store = Arc::new(PostgresPostStore::new(primary, replica));

    let redis = RedisConnection::open(&config.redis.url).context("Invalid REDIS_URL")?;
    let cache = Arc::new(RedisFeedCache::new(redis.clone()));
    if let Err(e) = cache.ping().await {
        // Cache calls fail individually and reconnect on next use
        warn!(error = %e, "Redis unreachable at startup, feed reads fall back to the store");
    }
    let registry = Arc::new(RedisSubscriberRegistry::new(redis));

    let broker: Option<Arc<dyn FeedBroker>> = match &config.broker.url {
        Some(url) => match RedisBroker::new(url, config.broker.topic.clone()) {
            Ok(broker) => Some(Arc::new(broker)),
            Err(e) => {
                warn!(error = %e, "Broker unavailable, real-time push disabled");
                None
            }
        },
        None => {
            warn!("BROKER_URL not set, real-time push disabled");
            None
        }
    };

    let coordinator = Arc::new(FanoutCoordinator::new(
        store.clone(),
        cache.clone(),
        registry.clone(),
        broker.clone(),
        config.feed.clone(),
    ));
    let (fanout, jobs) = FanoutQueue::new(coordinator.clone(), config.feed.fanout_queue_capacity);
    let reader = FeedReader::new(store.clone(), cache, config.feed.clone());
    let gateway = DeliveryGateway::new(
        config.app.instance_id.clone(),
        registry,
        config.gateway.registration_ttl(),
    );

    let mut tasks = BackgroundTasks::new();
    tasks.spawn("fanout-worker", move |shutdown| {
        run_fanout_worker(coordinator, jobs, shutdown)
    });
    if let Some(broker) = broker {
        let gateway = gateway.clone();
        tasks.spawn("delivery-listener", move |shutdown| {
            run_delivery_listener(gateway, broker, shutdown)
        });
    }

    let overflow_jobs = fanout.clone();
    let state = web::Data::new(AppState {
        store,
        reader,
        fanout,
        gateway,
        gateway_settings: config.gateway.clone(),
    });

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await;

    tasks.shutdown().await;
    if tokio::time::timeout(OVERFLOW_DRAIN_TIMEOUT, overflow_jobs.wait_overflow())
        .await
        .is_err()
    {
        warn!(
            in_flight = overflow_jobs.overflow_in_flight(),
            "Overflow fan-out jobs still running at exit"
        );
    }
    server_result.context("HTTP server error")?;

    info!("feed-fanout-service stopped");
    Ok(())
}
