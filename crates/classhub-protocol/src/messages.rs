use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    ChannelKey, ChatMessageData, JoinRequestData, LiveClassStatusData, NotificationData,
};

/// Frames sent from client to server over a realtime channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame on every connection
    Authenticate { token: String },

    /// Post a chat message (community channels only)
    SendMessage { content: String },

    /// Ping to keep connection alive
    Ping,
}

/// Event body pushed from server to client.
///
/// Serialized adjacently tagged so every frame reads `{type, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection admitted to the channel
    Admitted {
        connection_id: Uuid,
        channel: ChannelKey,
    },

    /// Error message; admission refusals are followed by a close
    Error { message: String },

    /// Pong response to ping
    Pong,

    /// New chat message persisted in a community
    ChatMessage(ChatMessageData),

    /// Notification created for the channel's user
    Notification(NotificationData),

    /// A student asked to join one of the tutor's communities
    JoinRequestSubmitted(JoinRequestData),

    /// A user became a participant of the community
    ParticipantJoined { community_slug: String, user_id: i64 },

    /// A user stopped being a participant of the community
    ParticipantLeft { community_slug: String, user_id: i64 },

    /// Live class activated or deactivated
    LiveClassStatus(LiveClassStatusData),
}

/// Frame sent from server to client: `{type, payload, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub event: ServerEvent,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    pub fn now(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_frame_shape() {
        let frame = serde_json::to_value(ServerMessage::now(ServerEvent::ParticipantJoined {
            community_slug: "math-101".to_string(),
            user_id: 7,
        }))
        .unwrap();

        assert_eq!(frame["type"], "participant_joined");
        assert_eq!(frame["payload"]["community_slug"], "math-101");
        assert_eq!(frame["payload"]["user_id"], 7);
        assert!(frame["timestamp"].is_string());
    }

    #[test]
    fn test_admitted_carries_channel_key() {
        let frame = serde_json::to_value(ServerEvent::Admitted {
            connection_id: Uuid::nil(),
            channel: ChannelKey::User(3),
        })
        .unwrap();

        assert_eq!(frame["payload"]["channel"], json!({ "kind": "user", "key": 3 }));
    }

    #[test]
    fn test_client_messages_parse() {
        let auth: ClientMessage =
            serde_json::from_value(json!({ "type": "authenticate", "token": "abc" })).unwrap();
        assert!(matches!(auth, ClientMessage::Authenticate { token } if token == "abc"));

        let ping: ClientMessage = serde_json::from_value(json!({ "type": "ping" })).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));

        assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "shout" })).is_err());
    }
}
