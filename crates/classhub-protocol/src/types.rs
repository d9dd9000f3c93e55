use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a realtime channel.
///
/// Community chat channels are keyed by the community slug, notification
/// channels by the numeric user id and live-class channels by the class id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ChannelKey {
    Community(String),
    User(i64),
    LiveClass(i64),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Community(slug) => write!(f, "community:{slug}"),
            ChannelKey::User(id) => write!(f, "user:{id}"),
            ChannelKey::LiveClass(id) => write!(f, "live_class:{id}"),
        }
    }
}

/// Chat message as pushed to community channel subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageData {
    pub id: i64,
    pub community_slug: String,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Notification as pushed to the recipient's channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    pub id: i64,
    pub recipient_id: i64,
    pub community_id: Option<i64>,
    pub message: String,
    pub notification_type: String,
    pub link: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A pending join request, as shown to the owning tutor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequestData {
    pub id: i64,
    pub community_slug: String,
    pub user_id: i64,
    pub username: String,
}

/// Live class activation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveClassStatusData {
    pub class_id: i64,
    pub title: String,
    pub is_active: bool,
}
