use crate::error::FeedError;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub broker: BrokerConfig,
    pub feed: FeedSettings,
    pub gateway: GatewaySettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Routing key of this process on the broker and its identity in the registry
    pub instance_id: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Read replica; `None` means reads share the primary
    pub ro_url: Option<String>,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("ro_url", &self.ro_url.as_ref().map(|_| "[REDACTED]"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Pub/sub endpoint; real-time push is disabled when unset
    pub url: Option<String>,
    pub topic: String,
}

/// Cache and fan-out tunables. Capacity, fan-out limit and page size are independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub fanout_limit: usize,
    pub page_size: usize,
    pub fanout_queue_capacity: usize,
}

impl FeedSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fanout_limit: default_fanout_limit(),
            page_size: default_page_size(),
            fanout_queue_capacity: default_fanout_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    pub registration_ttl_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl GatewaySettings {
    pub fn registration_ttl(&self) -> Duration {
        Duration::from_secs(self.registration_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            registration_ttl_secs: default_registration_ttl_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            client_timeout_secs: default_client_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, FeedError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| FeedError::Config("DATABASE_URL missing".into()))?;

        let config = Config {
            app: AppConfig {
                instance_id: env::var("INSTANCE_ID").unwrap_or_else(|_| default_instance_id()),
                host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("APP_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: database_url,
                ro_url: non_empty_var("DATABASE_RO_URL"),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 20)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            },
            broker: BrokerConfig {
                url: non_empty_var("BROKER_URL"),
                topic: env::var("FEED_TOPIC").unwrap_or_else(|_| "feed".to_string()),
            },
            feed: FeedSettings {
                cache_capacity: parse_var("FEED_CACHE_CAPACITY", default_cache_capacity())?,
                cache_ttl_secs: parse_var("FEED_CACHE_TTL_SECS", default_cache_ttl_secs())?,
                fanout_limit: parse_var("FEED_FANOUT_LIMIT", default_fanout_limit())?,
                page_size: parse_var("FEED_PAGE_SIZE", default_page_size())?,
                fanout_queue_capacity: parse_var(
                    "FANOUT_QUEUE_CAPACITY",
                    default_fanout_queue_capacity(),
                )?,
            },
            gateway: GatewaySettings {
                registration_ttl_secs: parse_var(
                    "REGISTRATION_TTL_SECS",
                    default_registration_ttl_secs(),
                )?,
                heartbeat_interval_secs: parse_var(
                    "WS_HEARTBEAT_INTERVAL_SECS",
                    default_heartbeat_interval_secs(),
                )?,
                client_timeout_secs: parse_var(
                    "WS_CLIENT_TIMEOUT_SECS",
                    default_client_timeout_secs(),
                )?,
            },
            log: LogConfig {
                level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                json: env::var("LOG_FORMAT")
                    .map(|v| !v.eq_ignore_ascii_case("text"))
                    .unwrap_or(true),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        let feed = &self.feed;
        if feed.cache_capacity == 0 {
            return Err(FeedError::Config("FEED_CACHE_CAPACITY must be > 0".into()));
        }
        if feed.cache_ttl_secs == 0 {
            return Err(FeedError::Config("FEED_CACHE_TTL_SECS must be > 0".into()));
        }
        if feed.fanout_limit == 0 {
            return Err(FeedError::Config("FEED_FANOUT_LIMIT must be > 0".into()));
        }
        if feed.page_size == 0 {
            return Err(FeedError::Config("FEED_PAGE_SIZE must be > 0".into()));
        }
        if feed.fanout_queue_capacity == 0 {
            return Err(FeedError::Config("FANOUT_QUEUE_CAPACITY must be > 0".into()));
        }

        let gw = &self.gateway;
        if gw.registration_ttl_secs == 0 {
            return Err(FeedError::Config("REGISTRATION_TTL_SECS must be > 0".into()));
        }
        // A registration must survive at least one missed heartbeat window
        if gw.heartbeat_interval_secs == 0 || gw.heartbeat_interval_secs >= gw.registration_ttl_secs
        {
            return Err(FeedError::Config(format!(
                "WS_HEARTBEAT_INTERVAL_SECS ({}) must be > 0 and shorter than REGISTRATION_TTL_SECS ({})",
                gw.heartbeat_interval_secs, gw.registration_ttl_secs
            )));
        }
        if self.app.instance_id.trim().is_empty() {
            return Err(FeedError::Config("INSTANCE_ID must not be empty".into()));
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, FeedError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FeedError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn default_instance_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("feed-{}", &id[..8])
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_fanout_limit() -> usize {
    20
}

fn default_page_size() -> usize {
    20
}

fn default_fanout_queue_capacity() -> usize {
    1024
}

fn default_registration_ttl_secs() -> u64 {
    30
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_client_timeout_secs() -> u64 {
    30
}
