use chrono::{DateTime, Utc};
use classhub_protocol::ChatMessageData;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub community_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn to_data(&self, community_slug: &str) -> ChatMessageData {
        ChatMessageData {
            id: self.id,
            community_slug: community_slug.to_string(),
            sender_id: self.sender_id,
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}
