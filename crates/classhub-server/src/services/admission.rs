//! Join-request state machine and participant lifecycle.
//!
//! Store calls are the atomic units. Realtime pushes and email dispatch
//! happen after commit and can never fail the operation.

use super::dispatcher::{DispatchJob, NotificationDispatcher};
use super::policy::policy_for;
use crate::db::MembershipStore;
use crate::error::{AppError, Result};
use crate::models::{
    Community, CommunitySummary, CreateCommunity, Identity, JoinOutcome, JoinRequest,
    MembershipResponse, NewCommunity, Resolution, slugify,
};
use crate::ws::RealtimeHub;
use classhub_protocol::{ChannelKey, JoinRequestData, NotificationData, ServerEvent};
use std::sync::Arc;

#[derive(Clone)]
pub struct AdmissionService {
    store: Arc<dyn MembershipStore>,
    hub: Arc<RealtimeHub>,
    dispatcher: NotificationDispatcher,
}

impl AdmissionService {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        hub: Arc<RealtimeHub>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            hub,
            dispatcher,
        }
    }

    pub async fn community(&self, slug: &str) -> Result<Community> {
        self.store
            .community_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Community not found".to_string()))
    }

    /// Tutors see the communities they own; everyone else sees all of them.
    pub async fn list_communities(&self, identity: &Identity) -> Result<Vec<CommunitySummary>> {
        let tutor_id = match identity {
            Identity::Tutor(tutor) => Some(tutor.id),
            Identity::Student(_) | Identity::Other(_) => None,
        };

        let communities = self.store.communities(tutor_id).await?;
        let mut summaries = Vec::with_capacity(communities.len());
        for community in communities {
            let participants = self.store.participants(community.id).await?;
            summaries.push(CommunitySummary {
                participant_count: participants.len(),
                is_joined: participants.iter().any(|p| p.user_id == identity.id()),
                community,
            });
        }
        Ok(summaries)
    }

    async fn owned_community(&self, slug: &str, identity: &Identity) -> Result<Community> {
        let community = self.community(slug).await?;
        if !identity.owns(&community) {
            return Err(AppError::NotAuthorized);
        }
        Ok(community)
    }

    /// Tutors only. The slug defaults to one derived from the name.
    pub async fn create_community(
        &self,
        identity: &Identity,
        input: CreateCommunity,
    ) -> Result<Community> {
        let Identity::Tutor(tutor) = identity else {
            return Err(AppError::NotAuthorized);
        };

        let slug = slugify(input.slug.as_deref().unwrap_or(&input.name));
        if slug.is_empty() {
            return Err(AppError::BadRequest(
                "Community name must contain letters or digits".to_string(),
            ));
        }
        if input.max_participants < 1 {
            return Err(AppError::BadRequest(
                "max_participants must be at least 1".to_string(),
            ));
        }

        let community = self
            .store
            .create_community(NewCommunity {
                slug,
                name: input.name,
                description: input.description,
                tutor_id: tutor.id,
                max_participants: input.max_participants,
            })
            .await?;

        tracing::info!("Tutor {} created community {}", tutor.id, community.slug);
        Ok(community)
    }

    pub async fn request_join(&self, slug: &str, identity: &Identity) -> Result<JoinOutcome> {
        let community = self.community(slug).await?;
        let admission = policy_for(identity)
            .admit(self.store.as_ref(), &community, identity.user())
            .await?;

        tracing::info!(
            "User {} join attempt on {}: {:?}",
            identity.id(),
            community.slug,
            admission.outcome
        );

        match (admission.outcome, admission.request) {
            (JoinOutcome::Joined, _) => {
                self.push_participant_joined(&community, identity.id()).await;
            }
            (outcome, Some(request)) if outcome.notifies_tutor() => {
                self.notify_tutor(&community, identity, &request).await;
            }
            _ => {}
        }

        Ok(admission.outcome)
    }

    /// Tutor-only view of a community's join requests, newest first.
    pub async fn join_requests(&self, slug: &str, identity: &Identity) -> Result<Vec<JoinRequest>> {
        let community = self.owned_community(slug, identity).await?;
        self.store.join_requests(community.id).await
    }

    pub async fn resolve_request(
        &self,
        slug: &str,
        request_id: i64,
        action: &str,
        identity: &Identity,
    ) -> Result<MembershipResponse> {
        let community = self.owned_community(slug, identity).await?;
        let resolution: Resolution = action.parse()?;

        let resolved = self
            .store
            .resolve_join_request(&community, request_id, resolution)
            .await?;
        let user_id = resolved.request.user_id;

        tracing::info!(
            "Tutor {} resolved join request {} on {}: {:?}",
            identity.id(),
            request_id,
            community.slug,
            resolution
        );

        self.hub
            .push(
                &ChannelKey::User(user_id),
                ServerEvent::Notification(NotificationData::from(&resolved.notification)),
            )
            .await;
        if resolved.participant_added {
            self.push_participant_joined(&community, user_id).await;
        }

        if let Some(email) = self.email_of(user_id).await {
            self.dispatcher.dispatch(DispatchJob::JoinRequestResolved {
                student_email: email,
                community_name: community.name.clone(),
                approved: resolution == Resolution::Approve,
            });
        }

        Ok(resolution.into())
    }

    pub async fn remove_participant(
        &self,
        slug: &str,
        identity: &Identity,
        target_user_id: i64,
    ) -> Result<MembershipResponse> {
        let community = self.owned_community(slug, identity).await?;
        let notification = self
            .store
            .remove_participant(&community, target_user_id)
            .await?;

        tracing::info!(
            "Tutor {} removed user {} from {}",
            identity.id(),
            target_user_id,
            community.slug
        );

        self.hub
            .push(
                &ChannelKey::User(target_user_id),
                ServerEvent::Notification(NotificationData::from(&notification)),
            )
            .await;
        self.push_participant_left(&community, target_user_id).await;

        if let Some(email) = self.email_of(target_user_id).await {
            self.dispatcher.dispatch(DispatchJob::ParticipantRemoved {
                student_email: email,
                community_name: community.name.clone(),
            });
        }

        Ok(MembershipResponse::Removed)
    }

    pub async fn exit_participant(
        &self,
        slug: &str,
        identity: &Identity,
    ) -> Result<MembershipResponse> {
        let community = self.community(slug).await?;
        self.store
            .exit_participant(community.id, identity.id())
            .await?;

        tracing::info!("User {} exited {}", identity.id(), community.slug);
        self.push_participant_left(&community, identity.id()).await;

        Ok(MembershipResponse::Exited)
    }

    async fn notify_tutor(&self, community: &Community, identity: &Identity, request: &JoinRequest) {
        let student = identity.user();

        self.hub
            .push(
                &ChannelKey::User(community.tutor_id),
                ServerEvent::JoinRequestSubmitted(JoinRequestData {
                    id: request.id,
                    community_slug: community.slug.clone(),
                    user_id: student.id,
                    username: student.username.clone(),
                }),
            )
            .await;

        if let Some(tutor_email) = self.email_of(community.tutor_id).await {
            self.dispatcher.dispatch(DispatchJob::JoinRequestSubmitted {
                tutor_email,
                student_username: student.username.clone(),
                community_name: community.name.clone(),
            });
        }
    }

    /// Best effort: a failed lookup only costs the email.
    async fn email_of(&self, user_id: i64) -> Option<String> {
        match self.store.user(user_id).await {
            Ok(Some(user)) => Some(user.email),
            Ok(None) => {
                tracing::warn!("No account for user {}, email skipped", user_id);
                None
            }
            Err(e) => {
                tracing::warn!("User lookup for {} failed, email skipped: {}", user_id, e);
                None
            }
        }
    }

    async fn push_participant_joined(&self, community: &Community, user_id: i64) {
        self.hub
            .push(
                &ChannelKey::Community(community.slug.clone()),
                ServerEvent::ParticipantJoined {
                    community_slug: community.slug.clone(),
                    user_id,
                },
            )
            .await;
    }

    async fn push_participant_left(&self, community: &Community, user_id: i64) {
        self.hub
            .push(
                &ChannelKey::Community(community.slug.clone()),
                ServerEvent::ParticipantLeft {
                    community_slug: community.slug.clone(),
                    user_id,
                },
            )
            .await;
    }
}
