//! In-process store used by tests and single-node development.
//!
//! Each community lives behind its own mutex. Mutations stage every
//! fallible step before touching shared state, so a failure leaves the
//! record exactly as it was.

use super::{MembershipStore, Resolved};
use crate::error::{AppError, Result};
use crate::models::{
    ChatMessage, Community, CreateLiveClass, JoinOutcome, JoinRequest, JoinRequestStatus,
    LiveClass, NewCommunity, NewNotification, Notification, Participant, Resolution, UserRef,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

struct CommunityRecord {
    community: Community,
    participants: BTreeMap<i64, Participant>,
    requests: BTreeMap<i64, JoinRequest>,
    /// user id -> request id; the (community, user) unique constraint
    request_by_user: HashMap<i64, i64>,
}

impl CommunityRecord {
    fn ensure_capacity(&self) -> Result<()> {
        if self.participants.len() >= self.community.max_participants.max(0) as usize {
            return Err(AppError::CapacityExceeded);
        }
        Ok(())
    }

    fn participant(&self, user_id: i64) -> Participant {
        Participant {
            community_id: self.community.id,
            user_id,
            joined_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    users: RwLock<HashMap<i64, UserRef>>,
    slugs: RwLock<HashMap<String, i64>>,
    communities: RwLock<HashMap<i64, Arc<Mutex<CommunityRecord>>>>,
    notifications: RwLock<BTreeMap<i64, Notification>>,
    messages: RwLock<Vec<ChatMessage>>,
    live_classes: RwLock<BTreeMap<i64, LiveClass>>,
    fail_next_notification: AtomicBool,
    live_class_read_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the user directory aware of an account.
    pub async fn register_user(&self, user: UserRef) {
        self.users.write().await.insert(user.id, user);
    }

    /// Fault injection: the next notification write fails, which must abort
    /// the whole unit it belongs to.
    pub fn fail_next_notification(&self) {
        self.fail_next_notification.store(true, Ordering::SeqCst);
    }

    /// Latency injection: live-class reads return their snapshot only after
    /// `delay`, so callers act on state that may have changed meanwhile.
    pub fn delay_live_class_reads(&self, delay: Duration) {
        self.live_class_read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// All persisted chat messages of a community in creation order.
    pub async fn messages(&self, community_id: i64) -> Vec<ChatMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| m.community_id == community_id)
            .cloned()
            .collect()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn record(&self, community_id: i64) -> Result<Arc<Mutex<CommunityRecord>>> {
        self.communities
            .read()
            .await
            .get(&community_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Community not found".to_string()))
    }

    /// Builds the row without storing it.
    fn stage_notification(&self, input: NewNotification) -> Result<Notification> {
        if self.fail_next_notification.swap(false, Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "injected notification write failure"
            )));
        }
        Ok(Notification {
            id: self.next_id(),
            recipient_id: input.recipient_id,
            community_id: input.community_id,
            message: input.message,
            notification_type: input.notification_type,
            link: input.link,
            is_read: false,
            created_at: Utc::now(),
        })
    }

    async fn commit_notification(&self, notification: &Notification) {
        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn user(&self, id: i64) -> Result<Option<UserRef>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create_community(&self, input: NewCommunity) -> Result<Community> {
        let mut slugs = self.slugs.write().await;
        if slugs.contains_key(&input.slug) {
            return Err(AppError::Conflict(format!(
                "Community slug '{}' is already taken",
                input.slug
            )));
        }

        let community = Community {
            id: self.next_id(),
            slug: input.slug,
            name: input.name,
            description: input.description,
            tutor_id: input.tutor_id,
            max_participants: input.max_participants,
            created_at: Utc::now(),
        };

        slugs.insert(community.slug.clone(), community.id);
        self.communities.write().await.insert(
            community.id,
            Arc::new(Mutex::new(CommunityRecord {
                community: community.clone(),
                participants: BTreeMap::new(),
                requests: BTreeMap::new(),
                request_by_user: HashMap::new(),
            })),
        );

        Ok(community)
    }

    async fn community_by_slug(&self, slug: &str) -> Result<Option<Community>> {
        let Some(id) = self.slugs.read().await.get(slug).copied() else {
            return Ok(None);
        };
        let record = self.record(id).await?;
        let community = record.lock().await.community.clone();
        Ok(Some(community))
    }

    async fn communities(&self, tutor_id: Option<i64>) -> Result<Vec<Community>> {
        let records: Vec<_> = self.communities.read().await.values().cloned().collect();
        let mut communities = Vec::with_capacity(records.len());
        for record in records {
            let community = record.lock().await.community.clone();
            if tutor_id.is_none_or(|id| id == community.tutor_id) {
                communities.push(community);
            }
        }
        communities.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(communities)
    }

    async fn is_participant(&self, community_id: i64, user_id: i64) -> Result<bool> {
        let record = self.record(community_id).await?;
        let is_participant = record.lock().await.participants.contains_key(&user_id);
        Ok(is_participant)
    }

    async fn participants(&self, community_id: i64) -> Result<Vec<Participant>> {
        let record = self.record(community_id).await?;
        let participants = record.lock().await.participants.values().cloned().collect();
        Ok(participants)
    }

    async fn upsert_join_request(
        &self,
        community_id: i64,
        user_id: i64,
    ) -> Result<(JoinRequest, JoinOutcome)> {
        let record = self.record(community_id).await?;
        let mut record = record.lock().await;

        if record.participants.contains_key(&user_id) {
            return Err(AppError::AlreadyMember);
        }

        if let Some(request_id) = record.request_by_user.get(&user_id).copied() {
            let request = record
                .requests
                .get_mut(&request_id)
                .ok_or_else(|| anyhow::anyhow!("join request index out of sync"))?;
            let outcome = match request.status {
                JoinRequestStatus::Pending => JoinOutcome::AlreadyPending,
                JoinRequestStatus::Approved => JoinOutcome::AlreadyApproved,
                JoinRequestStatus::Rejected => {
                    request.status = JoinRequestStatus::Pending;
                    JoinOutcome::Resubmitted
                }
            };
            return Ok((request.clone(), outcome));
        }

        let request = JoinRequest {
            id: self.next_id(),
            community_id,
            user_id,
            status: JoinRequestStatus::Pending,
            created_at: Utc::now(),
        };
        record.request_by_user.insert(user_id, request.id);
        record.requests.insert(request.id, request.clone());

        Ok((request, JoinOutcome::Submitted))
    }

    async fn join_requests(&self, community_id: i64) -> Result<Vec<JoinRequest>> {
        let record = self.record(community_id).await?;
        let mut requests: Vec<JoinRequest> =
            record.lock().await.requests.values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn add_participant(&self, community_id: i64, user_id: i64) -> Result<()> {
        let record = self.record(community_id).await?;
        let mut record = record.lock().await;

        if record.participants.contains_key(&user_id) {
            return Err(AppError::AlreadyMember);
        }
        record.ensure_capacity()?;

        let participant = record.participant(user_id);
        record.participants.insert(user_id, participant);
        Ok(())
    }

    async fn resolve_join_request(
        &self,
        community: &Community,
        request_id: i64,
        resolution: Resolution,
    ) -> Result<Resolved> {
        let record = self.record(community.id).await?;
        let mut record = record.lock().await;

        let mut request = record
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Join request not found".to_string()))?;

        if request.status == JoinRequestStatus::Approved && resolution == Resolution::Reject {
            return Err(AppError::InvalidAction(
                "request has already been approved".to_string(),
            ));
        }

        let participant_added = match resolution {
            Resolution::Approve if !record.participants.contains_key(&request.user_id) => {
                record.ensure_capacity()?;
                true
            }
            _ => false,
        };

        request.status = resolution.status();
        let notification = self.stage_notification(match resolution {
            Resolution::Approve => NewNotification::approved(request.user_id, community),
            Resolution::Reject => NewNotification::rejected(request.user_id, community),
        })?;

        // commit
        record.requests.insert(request.id, request.clone());
        if participant_added {
            let participant = record.participant(request.user_id);
            record.participants.insert(request.user_id, participant);
        }
        self.commit_notification(&notification).await;

        Ok(Resolved {
            request,
            notification,
            participant_added,
        })
    }

    async fn remove_participant(
        &self,
        community: &Community,
        user_id: i64,
    ) -> Result<Notification> {
        let record = self.record(community.id).await?;
        let mut record = record.lock().await;

        if !record.participants.contains_key(&user_id) {
            return Err(AppError::NotMember);
        }
        let notification = self.stage_notification(NewNotification::removed(user_id, community))?;

        record.participants.remove(&user_id);
        self.commit_notification(&notification).await;
        Ok(notification)
    }

    async fn exit_participant(&self, community_id: i64, user_id: i64) -> Result<()> {
        let record = self.record(community_id).await?;
        let mut record = record.lock().await;

        record
            .participants
            .remove(&user_id)
            .map(|_| ())
            .ok_or(AppError::NotMember)
    }

    async fn notifications(&self, recipient_id: i64) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .await
            .values()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, recipient_id: i64, id: i64) -> Result<Notification> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&id) {
            Some(n) if n.recipient_id == recipient_id => {
                n.is_read = true;
                Ok(n.clone())
            }
            _ => Err(AppError::NotFound("Notification not found".to_string())),
        }
    }

    async fn create_message(
        &self,
        community_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage {
            id: self.next_id(),
            community_id,
            sender_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn create_live_class(&self, tutor_id: i64, input: CreateLiveClass) -> Result<LiveClass> {
        let class = LiveClass {
            id: self.next_id(),
            tutor_id,
            title: input.title,
            topic: input.topic,
            session_link: input.session_link,
            is_active: true,
            created_at: Utc::now(),
        };
        self.live_classes.write().await.insert(class.id, class.clone());
        Ok(class)
    }

    async fn live_class(&self, id: i64) -> Result<Option<LiveClass>> {
        let class = self.live_classes.read().await.get(&id).cloned();
        let delay = self.live_class_read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(class)
    }

    async fn active_live_classes(&self) -> Result<Vec<LiveClass>> {
        Ok(self
            .live_classes
            .read()
            .await
            .values()
            .rev()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn deactivate_live_class(&self, id: i64) -> Result<LiveClass> {
        let mut classes = self.live_classes.write().await;
        let class = classes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Live class not found".to_string()))?;
        class.is_active = false;
        Ok(class.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn community(store: &MemoryStore, max_participants: i32) -> Community {
        store
            .create_community(NewCommunity {
                slug: "math-101".to_string(),
                name: "Math 101".to_string(),
                description: None,
                tutor_id: 1,
                max_participants,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_a_conflict() {
        let store = MemoryStore::new();
        community(&store, 5).await;

        let err = store
            .create_community(NewCommunity {
                slug: "math-101".to_string(),
                name: "Another".to_string(),
                description: None,
                tutor_id: 2,
                max_participants: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upsert_branches_on_existing_status() {
        let store = MemoryStore::new();
        let c = community(&store, 5).await;

        let (first, outcome) = store.upsert_join_request(c.id, 42).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Submitted);

        let (again, outcome) = store.upsert_join_request(c.id, 42).await.unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyPending);
        assert_eq!(again.id, first.id);

        store
            .resolve_join_request(&c, first.id, Resolution::Reject)
            .await
            .unwrap();
        let (revived, outcome) = store.upsert_join_request(c.id, 42).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Resubmitted);
        assert_eq!(revived.id, first.id);
        assert_eq!(revived.status, JoinRequestStatus::Pending);

        assert_eq!(store.join_requests(c.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_leaves_removal_uncommitted() {
        let store = MemoryStore::new();
        let c = community(&store, 5).await;
        store.add_participant(c.id, 7).await.unwrap();

        store.fail_next_notification();
        assert!(store.remove_participant(&c, 7).await.is_err());

        assert!(store.is_participant(c.id, 7).await.unwrap());
        assert!(store.notifications(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_is_recipient_only() {
        let store = MemoryStore::new();
        let c = community(&store, 5).await;
        store.add_participant(c.id, 7).await.unwrap();
        let n = store.remove_participant(&c, 7).await.unwrap();

        assert!(matches!(
            store.mark_notification_read(8, n.id).await,
            Err(AppError::NotFound(_))
        ));
        let read = store.mark_notification_read(7, n.id).await.unwrap();
        assert!(read.is_read);
    }

    #[tokio::test]
    async fn test_active_live_classes_excludes_deactivated() {
        let store = MemoryStore::new();
        let input = CreateLiveClass {
            title: "Algebra".to_string(),
            topic: None,
            session_link: "https://meet.example.com/algebra".to_string(),
        };
        let a = store.create_live_class(1, input.clone()).await.unwrap();
        let b = store.create_live_class(1, input).await.unwrap();

        store.deactivate_live_class(a.id).await.unwrap();

        let active = store.active_live_classes().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        // soft delete keeps the row
        assert!(!store.live_class(a.id).await.unwrap().unwrap().is_active);
    }
}
