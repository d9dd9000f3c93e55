use super::{MembershipStore, Resolved};
use crate::error::{AppError, Result};
use crate::models::{
    ChatMessage, Community, CreateLiveClass, JoinOutcome, JoinRequest, JoinRequestStatus,
    LiveClass, NewCommunity, NewNotification, Notification, Participant, Resolution, UserRef,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

const COMMUNITY_COLUMNS: &str =
    "id, slug, name, description, tutor_id, max_participants, created_at";
const JOIN_REQUEST_COLUMNS: &str = "id, community_id, user_id, status, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, community_id, message, notification_type, link, is_read, created_at";
const LIVE_CLASS_COLUMNS: &str = "id, tutor_id, title, topic, session_link, is_active, created_at";

/// PostgreSQL-backed store.
///
/// Mutations take `FOR UPDATE` on the community row, which serializes them
/// per community and keeps the capacity check and insert together.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock_community(
        tx: &mut Transaction<'_, Postgres>,
        community_id: i64,
    ) -> Result<Community> {
        sqlx::query_as::<_, Community>(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = $1 FOR UPDATE"
        ))
        .bind(community_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))
    }

    async fn is_participant_tx(
        tx: &mut Transaction<'_, Postgres>,
        community_id: i64,
        user_id: i64,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM community_participants WHERE community_id = $1 AND user_id = $2)",
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exists)
    }

    async fn insert_participant_checked(
        tx: &mut Transaction<'_, Postgres>,
        community: &Community,
        user_id: i64,
    ) -> Result<()> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM community_participants WHERE community_id = $1",
        )
        .bind(community.id)
        .fetch_one(&mut **tx)
        .await?;

        if count >= i64::from(community.max_participants) {
            return Err(AppError::CapacityExceeded);
        }

        sqlx::query(
            "INSERT INTO community_participants (community_id, user_id, joined_at) VALUES ($1, $2, NOW())",
        )
        .bind(community.id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_notification(
        tx: &mut Transaction<'_, Postgres>,
        input: NewNotification,
    ) -> Result<Notification> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (recipient_id, community_id, message, notification_type, link, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, false, NOW())
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(input.recipient_id)
        .bind(input.community_id)
        .bind(input.message)
        .bind(input.notification_type)
        .bind(input.link)
        .fetch_one(&mut **tx)
        .await?;
        Ok(notification)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn user(&self, id: i64) -> Result<Option<UserRef>> {
        let user = sqlx::query_as::<_, UserRef>("SELECT id, username, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create_community(&self, input: NewCommunity) -> Result<Community> {
        let community = sqlx::query_as::<_, Community>(&format!(
            r#"
            INSERT INTO communities (slug, name, description, tutor_id, max_participants, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (slug) DO NOTHING
            RETURNING {COMMUNITY_COLUMNS}
            "#
        ))
        .bind(&input.slug)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.tutor_id)
        .bind(input.max_participants)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!("Community slug '{}' is already taken", input.slug))
        })?;

        Ok(community)
    }

    async fn community_by_slug(&self, slug: &str) -> Result<Option<Community>> {
        let community = sqlx::query_as::<_, Community>(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;
        Ok(community)
    }

    async fn communities(&self, tutor_id: Option<i64>) -> Result<Vec<Community>> {
        let communities = sqlx::query_as::<_, Community>(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities WHERE $1::BIGINT IS NULL OR tutor_id = $1 ORDER BY id DESC"
        ))
        .bind(tutor_id)
        .fetch_all(&self.db)
        .await?;
        Ok(communities)
    }

    async fn is_participant(&self, community_id: i64, user_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM community_participants WHERE community_id = $1 AND user_id = $2)",
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn participants(&self, community_id: i64) -> Result<Vec<Participant>> {
        let participants = sqlx::query_as::<_, Participant>(
            "SELECT community_id, user_id, joined_at FROM community_participants WHERE community_id = $1 ORDER BY joined_at",
        )
        .bind(community_id)
        .fetch_all(&self.db)
        .await?;
        Ok(participants)
    }

    async fn upsert_join_request(
        &self,
        community_id: i64,
        user_id: i64,
    ) -> Result<(JoinRequest, JoinOutcome)> {
        let mut tx = self.db.begin().await?;
        Self::lock_community(&mut tx, community_id).await?;

        if Self::is_participant_tx(&mut tx, community_id, user_id).await? {
            return Err(AppError::AlreadyMember);
        }

        let inserted = sqlx::query_as::<_, JoinRequest>(&format!(
            r#"
            INSERT INTO join_requests (community_id, user_id, status, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (community_id, user_id) DO NOTHING
            RETURNING {JOIN_REQUEST_COLUMNS}
            "#
        ))
        .bind(community_id)
        .bind(user_id)
        .bind(JoinRequestStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match inserted {
            Some(request) => (request, JoinOutcome::Submitted),
            None => {
                let existing = sqlx::query_as::<_, JoinRequest>(&format!(
                    "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests WHERE community_id = $1 AND user_id = $2 FOR UPDATE"
                ))
                .bind(community_id)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

                match existing.status {
                    JoinRequestStatus::Pending => (existing, JoinOutcome::AlreadyPending),
                    JoinRequestStatus::Approved => (existing, JoinOutcome::AlreadyApproved),
                    JoinRequestStatus::Rejected => {
                        let revived = sqlx::query_as::<_, JoinRequest>(&format!(
                            "UPDATE join_requests SET status = $2 WHERE id = $1 RETURNING {JOIN_REQUEST_COLUMNS}"
                        ))
                        .bind(existing.id)
                        .bind(JoinRequestStatus::Pending)
                        .fetch_one(&mut *tx)
                        .await?;
                        (revived, JoinOutcome::Resubmitted)
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn join_requests(&self, community_id: i64) -> Result<Vec<JoinRequest>> {
        let requests = sqlx::query_as::<_, JoinRequest>(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests WHERE community_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(community_id)
        .fetch_all(&self.db)
        .await?;
        Ok(requests)
    }

    async fn add_participant(&self, community_id: i64, user_id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;
        let community = Self::lock_community(&mut tx, community_id).await?;

        if Self::is_participant_tx(&mut tx, community_id, user_id).await? {
            return Err(AppError::AlreadyMember);
        }
        Self::insert_participant_checked(&mut tx, &community, user_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn resolve_join_request(
        &self,
        community: &Community,
        request_id: i64,
        resolution: Resolution,
    ) -> Result<Resolved> {
        let mut tx = self.db.begin().await?;
        let locked = Self::lock_community(&mut tx, community.id).await?;

        let request = sqlx::query_as::<_, JoinRequest>(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests WHERE id = $1 AND community_id = $2 FOR UPDATE"
        ))
        .bind(request_id)
        .bind(community.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Join request not found".to_string()))?;

        if request.status == JoinRequestStatus::Approved && resolution == Resolution::Reject {
            return Err(AppError::InvalidAction(
                "request has already been approved".to_string(),
            ));
        }

        let mut participant_added = false;
        if resolution == Resolution::Approve
            && !Self::is_participant_tx(&mut tx, community.id, request.user_id).await?
        {
            Self::insert_participant_checked(&mut tx, &locked, request.user_id).await?;
            participant_added = true;
        }

        let request = sqlx::query_as::<_, JoinRequest>(&format!(
            "UPDATE join_requests SET status = $2 WHERE id = $1 RETURNING {JOIN_REQUEST_COLUMNS}"
        ))
        .bind(request.id)
        .bind(resolution.status())
        .fetch_one(&mut *tx)
        .await?;

        let notification = Self::insert_notification(
            &mut tx,
            match resolution {
                Resolution::Approve => NewNotification::approved(request.user_id, community),
                Resolution::Reject => NewNotification::rejected(request.user_id, community),
            },
        )
        .await?;

        tx.commit().await?;
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
        let mut tx = self.db.begin().await?;
        Self::lock_community(&mut tx, community.id).await?;

        let removed = sqlx::query(
            "DELETE FROM community_participants WHERE community_id = $1 AND user_id = $2",
        )
        .bind(community.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            return Err(AppError::NotMember);
        }

        let notification =
            Self::insert_notification(&mut tx, NewNotification::removed(user_id, community))
                .await?;

        tx.commit().await?;
        Ok(notification)
    }

    async fn exit_participant(&self, community_id: i64, user_id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;
        Self::lock_community(&mut tx, community_id).await?;

        let removed = sqlx::query(
            "DELETE FROM community_participants WHERE community_id = $1 AND user_id = $2",
        )
        .bind(community_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            return Err(AppError::NotMember);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn notifications(&self, recipient_id: i64) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(recipient_id)
        .fetch_all(&self.db)
        .await?;
        Ok(notifications)
    }

    async fn mark_notification_read(&self, recipient_id: i64, id: i64) -> Result<Notification> {
        sqlx::query_as::<_, Notification>(&format!(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND recipient_id = $2 RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }

    async fn create_message(
        &self,
        community_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO messages (community_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, community_id, sender_id, content, created_at
            "#,
        )
        .bind(community_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&self.db)
        .await?;
        Ok(message)
    }

    async fn create_live_class(&self, tutor_id: i64, input: CreateLiveClass) -> Result<LiveClass> {
        let class = sqlx::query_as::<_, LiveClass>(&format!(
            r#"
            INSERT INTO live_classes (tutor_id, title, topic, session_link, is_active, created_at)
            VALUES ($1, $2, $3, $4, true, NOW())
            RETURNING {LIVE_CLASS_COLUMNS}
            "#
        ))
        .bind(tutor_id)
        .bind(input.title)
        .bind(input.topic)
        .bind(input.session_link)
        .fetch_one(&self.db)
        .await?;
        Ok(class)
    }

    async fn live_class(&self, id: i64) -> Result<Option<LiveClass>> {
        let class = sqlx::query_as::<_, LiveClass>(&format!(
            "SELECT {LIVE_CLASS_COLUMNS} FROM live_classes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(class)
    }

    async fn active_live_classes(&self) -> Result<Vec<LiveClass>> {
        let classes = sqlx::query_as::<_, LiveClass>(&format!(
            "SELECT {LIVE_CLASS_COLUMNS} FROM live_classes WHERE is_active ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(classes)
    }

    async fn deactivate_live_class(&self, id: i64) -> Result<LiveClass> {
        sqlx::query_as::<_, LiveClass>(&format!(
            "UPDATE live_classes SET is_active = false WHERE id = $1 RETURNING {LIVE_CLASS_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Live class not found".to_string()))
    }
}
