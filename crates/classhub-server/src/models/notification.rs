use chrono::{DateTime, Utc};
use classhub_protocol::NotificationData;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Community;

pub const NOTIFICATION_TYPE_MESSAGE: &str = "message";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub community_id: Option<i64>,
    pub message: String,
    pub notification_type: String,
    pub link: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationData {
    fn from(n: &Notification) -> Self {
        NotificationData {
            id: n.id,
            recipient_id: n.recipient_id,
            community_id: n.community_id,
            message: n.message.clone(),
            notification_type: n.notification_type.clone(),
            link: n.link.clone(),
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

/// Notification to be written in the same unit as a membership transition
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub community_id: Option<i64>,
    pub message: String,
    pub notification_type: String,
    pub link: String,
}

impl NewNotification {
    fn membership(recipient_id: i64, community: &Community, message: String) -> Self {
        Self {
            recipient_id,
            community_id: Some(community.id),
            message,
            notification_type: NOTIFICATION_TYPE_MESSAGE.to_string(),
            link: community.link(),
        }
    }

    pub fn approved(recipient_id: i64, community: &Community) -> Self {
        Self::membership(
            recipient_id,
            community,
            format!("Your request to join {} was approved.", community.name),
        )
    }

    pub fn rejected(recipient_id: i64, community: &Community) -> Self {
        Self::membership(
            recipient_id,
            community,
            format!("Your request to join {} was rejected.", community.name),
        )
    }

    pub fn removed(recipient_id: i64, community: &Community) -> Self {
        Self::membership(
            recipient_id,
            community,
            format!("You have been removed from {}.", community.name),
        )
    }
}
