use crate::db::MembershipStore;
use crate::error::{AppError, Result};
use crate::models::{ChatMessage, Identity};
use crate::ws::RealtimeHub;
use classhub_protocol::{ChannelKey, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_MESSAGE_LEN: usize = 4000;

/// Persists community chat messages and fans them out.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn MembershipStore>,
    hub: Arc<RealtimeHub>,
    /// Per-community lane: persist and push happen under it, so every
    /// subscriber sees messages in persistence order.
    lanes: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl ChatService {
    pub fn new(store: Arc<dyn MembershipStore>, hub: Arc<RealtimeHub>) -> Self {
        Self {
            store,
            hub,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lane(&self, community_id: i64) -> Arc<Mutex<()>> {
        self.lanes
            .lock()
            .await
            .entry(community_id)
            .or_default()
            .clone()
    }

    pub async fn post(&self, slug: &str, identity: &Identity, content: &str) -> Result<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("Message cannot be empty".to_string()));
        }
        if content.len() > MAX_MESSAGE_LEN {
            return Err(AppError::BadRequest("Message is too long".to_string()));
        }

        let community = self
            .store
            .community_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

        if !identity.owns(&community)
            && !self.store.is_participant(community.id, identity.id()).await?
        {
            return Err(AppError::NotMember);
        }

        let lane = self.lane(community.id).await;
        let _guard = lane.lock().await;

        let message = self
            .store
            .create_message(community.id, identity.id(), content)
            .await?;
        self.hub
            .push(
                &ChannelKey::Community(community.slug.clone()),
                ServerEvent::ChatMessage(message.to_data(&community.slug)),
            )
            .await;

        Ok(message)
    }
}
