//! Feed records shared by the cache, the broker and the live sessions.
//!
//! Wire names are camelCase: a cached item is
//! `{id, author, authorName, text, createdAt, updatedAt}` and a routed
//! message is the same object plus `subscriberId`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Post as stored in the database of record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Directed follower -> followee edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FriendEdge {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
}

impl FriendEdge {
    pub fn new(follower_id: Uuid, followee_id: Uuid) -> Self {
        Self {
            follower_id,
            followee_id,
        }
    }

    pub fn is_self_edge(&self) -> bool {
        self.follower_id == self.followee_id
    }
}

/// One entry of a subscriber's feed: a post joined with its author's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: Uuid,
    #[serde(rename = "author")]
    pub author_id: Uuid,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn from_post(post: Post, author_name: impl Into<String>) -> Self {
        Self {
            id: post.id,
            author_id: post.author_id,
            author_name: author_name.into(),
            text: post.text,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Feed item addressed to one subscriber, published once per target instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedMessage {
    #[serde(flatten)]
    pub item: FeedItem,
    pub subscriber_id: Uuid,
}

impl RoutedMessage {
    pub fn new(item: FeedItem, subscriber_id: Uuid) -> Self {
        Self {
            item,
            subscriber_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item() -> FeedItem {
        FeedItem {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            author_name: "Ada Lovelace".to_string(),
            text: "hello".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn test_feed_item_wire_field_names() {
        let item = sample_item();
        let value = serde_json::to_value(&item).unwrap();
        let obj = value.as_object().unwrap();

        for field in ["id", "author", "authorName", "text", "createdAt", "updatedAt"] {
            assert!(obj.contains_key(field), "missing field {}", field);
        }
        assert_eq!(obj.len(), 6);
        assert_eq!(obj["author"], serde_json::json!(item.author_id));
    }

    #[test]
    fn test_routed_message_flattens_item() {
        let item = sample_item();
        let subscriber = Uuid::new_v4();
        let msg = RoutedMessage::new(item.clone(), subscriber);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["subscriberId"], serde_json::json!(subscriber));
        assert_eq!(value["authorName"], "Ada Lovelace");
        assert!(value.get("item").is_none());
    }

    #[test]
    fn test_routed_message_requires_subscriber() {
        let value = serde_json::to_value(sample_item()).unwrap();
        assert!(serde_json::from_value::<RoutedMessage>(value).is_err());
    }

    #[test]
    fn test_feed_item_missing_updated_at_defaults_to_none() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "author": Uuid::new_v4(),
            "authorName": "Grace",
            "text": "x",
            "createdAt": "2024-01-02T03:04:05Z"
        });
        let item: FeedItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.updated_at, None);
    }

    #[test]
    fn test_self_edge_detection() {
        let user = Uuid::new_v4();
        assert!(FriendEdge::new(user, user).is_self_edge());
        assert!(!FriendEdge::new(user, Uuid::new_v4()).is_self_edge());
    }
}
