use crate::db::MembershipStore;
use crate::error::{AppError, Result};
use crate::models::Identity;
use classhub_protocol::{ChannelKey, ServerEvent, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// A connection admitted to one channel.
///
/// Frames pushed to the channel arrive on `receiver` as serialized JSON.
pub struct Subscription {
    pub connection_id: Uuid,
    pub channel: ChannelKey,
    pub receiver: mpsc::Receiver<String>,
}

#[derive(Debug, Clone)]
struct ConnectionInfo {
    user_id: i64,
    channel: ChannelKey,
    sender: mpsc::Sender<String>,
}

/// Realtime fan-out for community chat, user notification and live-class
/// channels.
///
/// Admission is checked against the store on every connect. Membership
/// changes after that do not evict existing connections.
pub struct RealtimeHub {
    store: Arc<dyn MembershipStore>,
    /// Outbound queue depth per connection
    buffer: usize,
    /// Map from connection ID to connection info
    connections: RwLock<HashMap<Uuid, ConnectionInfo>>,
    /// Map from channel to the connections admitted to it
    channel_subscribers: RwLock<HashMap<ChannelKey, HashSet<Uuid>>>,
    /// Deactivated live classes: no new admissions, existing sockets drain
    closed_classes: RwLock<HashSet<i64>>,
}

impl RealtimeHub {
    pub fn new(store: Arc<dyn MembershipStore>, buffer: usize) -> Self {
        Self {
            store,
            buffer: buffer.max(1),
            connections: RwLock::new(HashMap::new()),
            channel_subscribers: RwLock::new(HashMap::new()),
            closed_classes: RwLock::new(HashSet::new()),
        }
    }

    /// Checks that `identity` may join `channel` right now.
    pub async fn authorize(&self, identity: &Identity, channel: &ChannelKey) -> Result<()> {
        match channel {
            ChannelKey::Community(slug) => {
                let community = self
                    .store
                    .community_by_slug(slug)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

                if identity.owns(&community)
                    || self.store.is_participant(community.id, identity.id()).await?
                {
                    Ok(())
                } else {
                    Err(AppError::NotAuthorized)
                }
            }
            ChannelKey::User(user_id) => {
                if identity.id() == *user_id {
                    Ok(())
                } else {
                    Err(AppError::NotAuthorized)
                }
            }
            ChannelKey::LiveClass(class_id) => {
                if self.closed_classes.read().await.contains(class_id) {
                    return Err(AppError::NotAuthorized);
                }
                let class = self
                    .store
                    .live_class(*class_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Live class not found".to_string()))?;

                if class.is_active {
                    Ok(())
                } else {
                    Err(AppError::NotAuthorized)
                }
            }
        }
    }

    /// Admits a connection or refuses it. A refused connection never receives a push.
    pub async fn connect(&self, identity: &Identity, channel: ChannelKey) -> Result<Subscription> {
        self.authorize(identity, &channel).await?;

        let connection_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer);

        self.connections.write().await.insert(
            connection_id,
            ConnectionInfo {
                user_id: identity.id(),
                channel: channel.clone(),
                sender,
            },
        );
        self.channel_subscribers
            .write()
            .await
            .entry(channel.clone())
            .or_default()
            .insert(connection_id);

        // a close that landed while authorize awaited the store still wins
        if let ChannelKey::LiveClass(class_id) = &channel {
            if self.closed_classes.read().await.contains(class_id) {
                self.disconnect(connection_id).await;
                return Err(AppError::NotAuthorized);
            }
        }

        tracing::debug!(
            "User {} admitted to {} with connection ID {}",
            identity.id(),
            channel,
            connection_id
        );

        Ok(Subscription {
            connection_id,
            channel,
            receiver,
        })
    }

    pub async fn disconnect(&self, connection_id: Uuid) {
        let info = self.connections.write().await.remove(&connection_id);

        if let Some(info) = info {
            let mut subscribers = self.channel_subscribers.write().await;
            if let Some(subs) = subscribers.get_mut(&info.channel) {
                subs.remove(&connection_id);
                if subs.is_empty() {
                    subscribers.remove(&info.channel);
                }
            }

            tracing::debug!(
                "User {} left {} (connection ID {})",
                info.user_id,
                info.channel,
                connection_id
            );
        }
    }

    /// Pushes `event` to every connection on `channel`.
    ///
    /// A full connection queue drops this event for that connection only;
    /// a closed one is removed. Returns the number of connections reached.
    pub async fn push(&self, channel: &ChannelKey, event: ServerEvent) -> usize {
        let Some(json) = encode(&ServerMessage::now(event)) else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.channel_subscribers.read().await;
            let connections = self.connections.read().await;

            let Some(subs) = subscribers.get(channel) else {
                tracing::debug!("No subscribers for {}", channel);
                return 0;
            };

            tracing::debug!("Pushing to {} subscribers of {}", subs.len(), channel);
            for conn_id in subs {
                let Some(info) = connections.get(conn_id) else {
                    continue;
                };
                match info.sender.try_send(json.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("Connection {} is lagging, dropped push on {}", conn_id, channel);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*conn_id),
                }
            }
        }

        for conn_id in closed {
            self.disconnect(conn_id).await;
        }

        delivered
    }

    pub async fn send_to_connection(&self, connection_id: Uuid, event: ServerEvent) {
        let Some(json) = encode(&ServerMessage::now(event)) else {
            return;
        };

        let connections = self.connections.read().await;
        if let Some(info) = connections.get(&connection_id) {
            if let Err(e) = info.sender.try_send(json) {
                tracing::warn!("Failed to send message to {}: {}", connection_id, e);
            }
        }
    }

    /// Refuse new admissions to a live class without touching existing ones.
    ///
    /// Call before pushing the final status event, so that every connection
    /// either receives that event or is refused.
    pub async fn close_live_class(&self, class_id: i64) {
        self.closed_classes.write().await.insert(class_id);
    }

    pub async fn connection_count(&self, channel: &ChannelKey) -> usize {
        self.channel_subscribers
            .read()
            .await
            .get(channel)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

pub(crate) fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            None
        }
    }
}
