use super::{validate_edge, validate_post_text, PostStore};
use crate::error::{FeedError, Result};
use crate::models::{FeedItem, FriendEdge};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const FEED_ITEM_COLUMNS: &str = r#"
    p.id,
    p.author_id,
    TRIM(CONCAT(u.first_name, ' ', COALESCE(u.last_name, ''))) AS author_name,
    p.text,
    p.created_at,
    p.updated_at
"#;

// PostgreSQL foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// A write that referenced a user row that does not exist becomes
/// `NotFound`; anything else stays a database error.
fn map_missing_user(err: sqlx::Error, users: &[Uuid]) -> FeedError {
    let missing_reference = err
        .as_database_error()
        .and_then(|db_err| db_err.code())
        .as_deref()
        == Some(FOREIGN_KEY_VIOLATION);

    if missing_reference {
        let ids: Vec<String> = users.iter().map(Uuid::to_string).collect();
        FeedError::NotFound(format!("user {}", ids.join(" or ")))
    } else {
        FeedError::Database(err)
    }
}

/// PostgreSQL posts and friend graph.
///
/// Writes and `post_by_id` go to the primary pool; feed queries go to the
/// read pool, which may be a lagging replica.
#[derive(Clone)]
pub struct PostgresPostStore {
    primary: PgPool,
    replica: PgPool,
}

impl PostgresPostStore {
    pub fn new(primary: PgPool, replica: PgPool) -> Self {
        Self { primary, replica }
    }

    /// Store backed by a single pool for both reads and writes
    pub fn single(pool: PgPool) -> Self {
        Self {
            primary: pool.clone(),
            replica: pool,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.primary).await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for PostgresPostStore {
    async fn create_post(&self, author_id: Uuid, text: &str) -> Result<Uuid> {
        let text = validate_post_text(text)?;
        let post_id = Uuid::new_v4();

        let mut tx = self.primary.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, text, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NULL)
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_missing_user(e, &[author_id]))?;
        tx.commit().await?;

        debug!(post_id = %post_id, author_id = %author_id, "Created post");
        Ok(post_id)
    }

    async fn post_by_id(&self, post_id: Uuid) -> Result<Option<FeedItem>> {
        let sql = format!(
            "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id WHERE p.id = $1",
            FEED_ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, FeedItem>(&sql)
            .bind(post_id)
            .fetch_optional(&self.primary)
            .await?;
        Ok(item)
    }

    async fn friends_feed(&self, subscriber_id: Uuid, limit: usize) -> Result<Vec<FeedItem>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM posts p
            JOIN friends f ON f.friend_id = p.author_id
            JOIN users u ON u.id = p.author_id
            WHERE f.user_id = $1
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $2
            "#,
            FEED_ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, FeedItem>(&sql)
            .bind(subscriber_id)
            .bind(limit as i64)
            .fetch_all(&self.replica)
            .await?;

        debug!(
            subscriber_id = %subscriber_id,
            count = items.len(),
            "Loaded friends feed"
        );
        Ok(items)
    }

    async fn followers_of(&self, author_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let followers = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM friends
            WHERE friend_id = $1
            ORDER BY user_id
            LIMIT $2
            "#,
        )
        .bind(author_id)
        .bind(limit as i64)
        .fetch_all(&self.replica)
        .await?;
        Ok(followers)
    }

    async fn add_friend(&self, edge: FriendEdge) -> Result<()> {
        validate_edge(&edge)?;
        sqlx::query(
            r#"
            INSERT INTO friends (user_id, friend_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, friend_id) DO NOTHING
            "#,
        )
        .bind(edge.follower_id)
        .bind(edge.followee_id)
        .execute(&self.primary)
        .await
        .map_err(|e| map_missing_user(e, &[edge.follower_id, edge.followee_id]))?;

        debug!(
            "Created friend edge: {} -> {}",
            edge.follower_id, edge.followee_id
        );
        Ok(())
    }

    async fn remove_friend(&self, edge: FriendEdge) -> Result<()> {
        sqlx::query("DELETE FROM friends WHERE user_id = $1 AND friend_id = $2")
            .bind(edge.follower_id)
            .bind(edge.followee_id)
            .execute(&self.primary)
            .await?;

        debug!(
            "Deleted friend edge: {} -> {}",
            edge.follower_id, edge.followee_id
        );
        Ok(())
    }
}
