mod memory;
mod postgres;

pub use memory::InMemoryPostStore;
pub use postgres::PostgresPostStore;

use crate::error::{FeedError, Result};
use crate::models::{FeedItem, FriendEdge};
use async_trait::async_trait;
use uuid::Uuid;

/// Longest post body accepted by `create_post`, in characters
pub const MAX_POST_LENGTH: usize = 4096;

/// Durable posts and social graph, the source of truth behind the feed cache.
///
/// Only `create_post`, `add_friend` and `remove_friend` write. Feed queries
/// may be served from a lagging replica.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new post and return its id
    async fn create_post(&self, author_id: Uuid, text: &str) -> Result<Uuid>;

    /// A single post joined with its author's name, read from the primary
    async fn post_by_id(&self, post_id: Uuid) -> Result<Option<FeedItem>>;

    /// Posts by everyone `subscriber_id` follows, newest first
    async fn friends_feed(&self, subscriber_id: Uuid, limit: usize) -> Result<Vec<FeedItem>>;

    /// Users following `author_id`, in store order (by follower id)
    async fn followers_of(&self, author_id: Uuid, limit: usize) -> Result<Vec<Uuid>>;

    /// Idempotent; rejects self-edges
    async fn add_friend(&self, edge: FriendEdge) -> Result<()>;

    /// Idempotent
    async fn remove_friend(&self, edge: FriendEdge) -> Result<()>;
}

pub(crate) fn validate_post_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FeedError::InvalidInput("post text must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_POST_LENGTH {
        return Err(FeedError::InvalidInput(format!(
            "post text exceeds {} characters",
            MAX_POST_LENGTH
        )));
    }
    Ok(trimmed)
}

pub(crate) fn validate_edge(edge: &FriendEdge) -> Result<()> {
    if edge.is_self_edge() {
        return Err(FeedError::InvalidInput("a user cannot follow themselves".into()));
    }
    Ok(())
}
