//! Membership Store: authoritative state for communities, participants,
//! join requests, notifications, chat messages and live classes.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::{
    ChatMessage, Community, CreateLiveClass, JoinOutcome, JoinRequest, LiveClass, NewCommunity,
    Notification, Participant, Resolution, UserRef,
};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    tracing::info!("Database connection pool initialized");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Outcome of a committed tutor decision
#[derive(Debug, Clone)]
pub struct Resolved {
    pub request: JoinRequest,
    pub notification: Notification,
    /// False when the user was already a participant
    pub participant_added: bool,
}

/// Storage contract for membership state.
///
/// Every mutating method is a single atomic unit: it either commits all of
/// its writes or none of them. Implementations serialize mutations per
/// community, so concurrent calls on the same (community, user) pair cannot
/// interleave and the capacity check always sees the count it inserts against.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn user(&self, id: i64) -> Result<Option<UserRef>>;

    /// Fails with `Conflict` when the slug is taken.
    async fn create_community(&self, input: NewCommunity) -> Result<Community>;

    async fn community_by_slug(&self, slug: &str) -> Result<Option<Community>>;

    /// Newest first; only the given tutor's communities when `tutor_id` is set.
    async fn communities(&self, tutor_id: Option<i64>) -> Result<Vec<Community>>;

    async fn is_participant(&self, community_id: i64, user_id: i64) -> Result<bool>;

    async fn participants(&self, community_id: i64) -> Result<Vec<Participant>>;

    /// Conditional insert-or-fetch on (community, user).
    ///
    /// - participant: `AlreadyMember`
    /// - no request: insert pending, `Submitted`
    /// - pending: `AlreadyPending`, untouched
    /// - approved: `AlreadyApproved`, untouched
    /// - rejected: flipped back to pending, `Resubmitted`
    async fn upsert_join_request(
        &self,
        community_id: i64,
        user_id: i64,
    ) -> Result<(JoinRequest, JoinOutcome)>;

    /// Newest first.
    async fn join_requests(&self, community_id: i64) -> Result<Vec<JoinRequest>>;

    /// Direct join: capacity check and insert in one unit.
    async fn add_participant(&self, community_id: i64, user_id: i64) -> Result<()>;

    /// Status change, participant add (approve) and recipient notification.
    ///
    /// `NotFound` if the request is not in `community`; `CapacityExceeded`
    /// leaves the request pending; rejecting an approved request is
    /// `InvalidAction`.
    async fn resolve_join_request(
        &self,
        community: &Community,
        request_id: i64,
        resolution: Resolution,
    ) -> Result<Resolved>;

    /// Membership delete plus removal notification. Join requests untouched.
    async fn remove_participant(&self, community: &Community, user_id: i64)
    -> Result<Notification>;

    async fn exit_participant(&self, community_id: i64, user_id: i64) -> Result<()>;

    /// Newest first.
    async fn notifications(&self, recipient_id: i64) -> Result<Vec<Notification>>;

    /// `NotFound` unless the notification belongs to `recipient_id`.
    async fn mark_notification_read(&self, recipient_id: i64, id: i64) -> Result<Notification>;

    async fn create_message(
        &self,
        community_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<ChatMessage>;

    async fn create_live_class(&self, tutor_id: i64, input: CreateLiveClass) -> Result<LiveClass>;

    async fn live_class(&self, id: i64) -> Result<Option<LiveClass>>;

    /// Newest first.
    async fn active_live_classes(&self) -> Result<Vec<LiveClass>>;

    /// Soft delete: sets `is_active = false` and returns the updated row.
    async fn deactivate_live_class(&self, id: i64) -> Result<LiveClass>;
}
