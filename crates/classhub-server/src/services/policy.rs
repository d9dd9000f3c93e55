//! How a caller gets into a community depends on who they are: students go
//! through tutor approval, everyone else joins directly.

use crate::db::MembershipStore;
use crate::error::Result;
use crate::models::{Community, Identity, JoinOutcome, JoinRequest, UserRef};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct Admission {
    pub outcome: JoinOutcome,
    /// Set when the attempt went through the request workflow
    pub request: Option<JoinRequest>,
}

#[async_trait]
pub trait AdmissionPolicy: Send + Sync {
    async fn admit(
        &self,
        store: &dyn MembershipStore,
        community: &Community,
        user: &UserRef,
    ) -> Result<Admission>;
}

/// Pending request that the owning tutor approves or rejects
pub struct RequestApprovalPolicy;

#[async_trait]
impl AdmissionPolicy for RequestApprovalPolicy {
    async fn admit(
        &self,
        store: &dyn MembershipStore,
        community: &Community,
        user: &UserRef,
    ) -> Result<Admission> {
        let (request, outcome) = store.upsert_join_request(community.id, user.id).await?;
        Ok(Admission {
            outcome,
            request: Some(request),
        })
    }
}

/// Immediate participant insert, still bounded by capacity
pub struct DirectJoinPolicy;

#[async_trait]
impl AdmissionPolicy for DirectJoinPolicy {
    async fn admit(
        &self,
        store: &dyn MembershipStore,
        community: &Community,
        user: &UserRef,
    ) -> Result<Admission> {
        store.add_participant(community.id, user.id).await?;
        Ok(Admission {
            outcome: JoinOutcome::Joined,
            request: None,
        })
    }
}

pub fn policy_for(identity: &Identity) -> &'static dyn AdmissionPolicy {
    match identity {
        Identity::Student(_) => &RequestApprovalPolicy,
        Identity::Tutor(_) | Identity::Other(_) => &DirectJoinPolicy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::AppError;
    use crate::models::NewCommunity;

    fn user(id: i64) -> UserRef {
        UserRef {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
        }
    }

    #[tokio::test]
    async fn test_policy_selection_by_identity() {
        let store = MemoryStore::new();
        let community = store
            .create_community(NewCommunity {
                slug: "chem".to_string(),
                name: "Chem".to_string(),
                description: None,
                tutor_id: 1,
                max_participants: 1,
            })
            .await
            .unwrap();

        let student = policy_for(&Identity::Student(user(2)))
            .admit(&store, &community, &user(2))
            .await
            .unwrap();
        assert_eq!(student.outcome, JoinOutcome::Submitted);
        assert!(!store.is_participant(community.id, 2).await.unwrap());

        let other = policy_for(&Identity::Other(user(3)))
            .admit(&store, &community, &user(3))
            .await
            .unwrap();
        assert_eq!(other.outcome, JoinOutcome::Joined);
        assert!(other.request.is_none());

        let err = policy_for(&Identity::Tutor(user(4)))
            .admit(&store, &community, &user(4))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded));
    }
}
