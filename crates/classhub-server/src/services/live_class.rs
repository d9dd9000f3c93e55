use crate::db::MembershipStore;
use crate::error::{AppError, Result};
use crate::models::{CreateLiveClass, Identity, LiveClass};
use crate::ws::RealtimeHub;
use classhub_protocol::{ChannelKey, ServerEvent};
use std::sync::Arc;

#[derive(Clone)]
pub struct LiveClassService {
    store: Arc<dyn MembershipStore>,
    hub: Arc<RealtimeHub>,
}

impl LiveClassService {
    pub fn new(store: Arc<dyn MembershipStore>, hub: Arc<RealtimeHub>) -> Self {
        Self { store, hub }
    }

    pub async fn create(&self, identity: &Identity, input: CreateLiveClass) -> Result<LiveClass> {
        let Identity::Tutor(tutor) = identity else {
            return Err(AppError::NotAuthorized);
        };
        if input.title.trim().is_empty() || input.session_link.trim().is_empty() {
            return Err(AppError::BadRequest(
                "title and session_link are required".to_string(),
            ));
        }

        let class = self.store.create_live_class(tutor.id, input).await?;
        tracing::info!("Tutor {} started live class {}", tutor.id, class.id);
        Ok(class)
    }

    pub async fn list_active(&self) -> Result<Vec<LiveClass>> {
        self.store.active_live_classes().await
    }

    pub async fn get(&self, id: i64) -> Result<LiveClass> {
        self.store
            .live_class(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Live class not found".to_string()))
    }

    /// Soft delete by the owning tutor. New admissions are refused first, then
    /// connected attendees get the status event and stay connected.
    pub async fn deactivate(&self, id: i64, identity: &Identity) -> Result<LiveClass> {
        let class = self.get(id).await?;
        if !matches!(identity, Identity::Tutor(user) if user.id == class.tutor_id) {
            return Err(AppError::NotAuthorized);
        }
        if !class.is_active {
            return Ok(class);
        }

        let class = self.store.deactivate_live_class(id).await?;
        tracing::info!("Tutor {} closed live class {}", identity.id(), id);

        self.hub.close_live_class(id).await;
        self.hub
            .push(
                &ChannelKey::LiveClass(id),
                ServerEvent::LiveClassStatus(class.status_data()),
            )
            .await;

        Ok(class)
    }
}
