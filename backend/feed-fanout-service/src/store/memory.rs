use super::{validate_edge, validate_post_text, PostStore};
use crate::error::{FeedError, Result};
use crate::models::{FeedItem, FriendEdge, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    names: HashMap<Uuid, String>,
    posts: Vec<Post>,
    // (follower, followee); BTreeSet gives the by-follower store order
    edges: BTreeSet<(Uuid, Uuid)>,
}

/// Process-local post store for single-node runs and tests
#[derive(Default, Clone)]
pub struct InMemoryPostStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's display name; posts by unknown users are rejected
    pub async fn add_user(&self, user_id: Uuid, display_name: impl Into<String>) {
        self.inner
            .write()
            .await
            .names
            .insert(user_id, display_name.into());
    }

    /// Insert a post with an explicit timestamp
    pub async fn insert_post_at(
        &self,
        author_id: Uuid,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let text = validate_post_text(text)?;
        let mut guard = self.inner.write().await;
        if !guard.names.contains_key(&author_id) {
            return Err(FeedError::NotFound(format!("user {}", author_id)));
        }
        let post = Post {
            id: Uuid::new_v4(),
            author_id,
            text: text.to_string(),
            created_at,
            updated_at: None,
        };
        let id = post.id;
        guard.posts.push(post);
        Ok(id)
    }
}

impl Inner {
    fn feed_item(&self, post: &Post) -> FeedItem {
        let name = self.names.get(&post.author_id).cloned().unwrap_or_default();
        FeedItem::from_post(post.clone(), name)
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn create_post(&self, author_id: Uuid, text: &str) -> Result<Uuid> {
        self.insert_post_at(author_id, text, Utc::now()).await
    }

    async fn post_by_id(&self, post_id: Uuid) -> Result<Option<FeedItem>> {
        let guard = self.inner.read().await;
        Ok(guard
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .map(|p| guard.feed_item(p)))
    }

    async fn friends_feed(&self, subscriber_id: Uuid, limit: usize) -> Result<Vec<FeedItem>> {
        let guard = self.inner.read().await;
        let mut posts: Vec<&Post> = guard
            .posts
            .iter()
            .filter(|p| guard.edges.contains(&(subscriber_id, p.author_id)))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(posts
            .into_iter()
            .take(limit)
            .map(|p| guard.feed_item(p))
            .collect())
    }

    async fn followers_of(&self, author_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let guard = self.inner.read().await;
        Ok(guard
            .edges
            .iter()
            .filter(|(_, followee)| *followee == author_id)
            .map(|(follower, _)| *follower)
            .take(limit)
            .collect())
    }

    async fn add_friend(&self, edge: FriendEdge) -> Result<()> {
        validate_edge(&edge)?;
        let mut guard = self.inner.write().await;
        for user in [edge.follower_id, edge.followee_id] {
            if !guard.names.contains_key(&user) {
                return Err(FeedError::NotFound(format!("user {}", user)));
            }
        }
        guard.edges.insert((edge.follower_id, edge.followee_id));
        Ok(())
    }

    async fn remove_friend(&self, edge: FriendEdge) -> Result<()> {
        self.inner
            .write()
            .await
            .edges
            .remove(&(edge.follower_id, edge.followee_id));
        Ok(())
    }
}
