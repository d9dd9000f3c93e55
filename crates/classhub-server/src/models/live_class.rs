use chrono::{DateTime, Utc};
use classhub_protocol::LiveClassStatusData;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tutor-hosted live session. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LiveClass {
    pub id: i64,
    pub tutor_id: i64,
    pub title: String,
    pub topic: Option<String>,
    pub session_link: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl LiveClass {
    pub fn status_data(&self) -> LiveClassStatusData {
        LiveClassStatusData {
            class_id: self.id,
            title: self.title.clone(),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLiveClass {
    pub title: String,
    pub topic: Option<String>,
    pub session_link: String,
}
