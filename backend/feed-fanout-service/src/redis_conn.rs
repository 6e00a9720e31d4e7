//! Lazily established Redis connection.
//!
//! The `ConnectionManager` is created on first use instead of at startup, so
//! an unreachable Redis fails individual operations rather than the process.
//! A failed attempt leaves the slot empty and the next call tries again.

use crate::error::Result;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

#[derive(Clone)]
pub struct RedisConnection {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
}

impl RedisConnection {
    /// Parse the URL only; no network I/O happens here
    pub fn open(url: &str) -> Result<Self> {
        Ok(Self::from_client(Client::open(url)?))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            manager: Arc::new(OnceCell::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Shared connection, connecting on first call
    pub async fn get(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                match ConnectionManager::new(self.client.clone()).await {
                    Ok(manager) => {
                        info!("Connected to Redis");
                        Ok(manager)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis connection failed, will retry on next use");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(manager.clone())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
