//! Feed fan-out and real-time delivery
//!
//! New posts are fanned out into per-subscriber feed caches in Redis and
//! pushed to live sessions on whichever instances hold them.

pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod redis_conn;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use error::{FeedError, Result};
