use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::error::AppError;

/// A Community - a tutor-owned group with a bounded participant set
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Community {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub tutor_id: i64,
    pub max_participants: i32,
    pub created_at: DateTime<Utc>,
}

impl Community {
    pub fn link(&self) -> String {
        format!("/community/{}", self.slug)
    }
}

/// Community as listed to a caller, with the caller's own membership
#[derive(Debug, Clone, Serialize)]
pub struct CommunitySummary {
    #[serde(flatten)]
    pub community: Community,
    pub participant_count: usize,
    pub is_joined: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub community_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommunity {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub max_participants: i32,
}

/// Validated input for the store
#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub tutor_id: i64,
    pub max_participants: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "join_request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JoinRequest {
    pub id: i64,
    pub community_id: i64,
    pub user_id: i64,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of the guarded join-request upsert, or of a direct join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Submitted,
    AlreadyPending,
    AlreadyApproved,
    Resubmitted,
    Joined,
}

/// Wire status of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Pending,
    ApprovedAlready,
    Resubmitted,
    Joined,
}

impl JoinOutcome {
    pub fn status(self) -> JoinStatus {
        match self {
            JoinOutcome::Submitted | JoinOutcome::AlreadyPending => JoinStatus::Pending,
            JoinOutcome::AlreadyApproved => JoinStatus::ApprovedAlready,
            JoinOutcome::Resubmitted => JoinStatus::Resubmitted,
            JoinOutcome::Joined => JoinStatus::Joined,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            JoinOutcome::Submitted => "Join request submitted. Please wait for tutor approval.",
            JoinOutcome::AlreadyPending => "Join request already pending.",
            JoinOutcome::AlreadyApproved => "You are already approved for this community.",
            JoinOutcome::Resubmitted => "Join request re-submitted.",
            JoinOutcome::Joined => "Successfully joined the community.",
        }
    }

    /// Whether the tutor should hear about this attempt
    pub fn notifies_tutor(self) -> bool {
        matches!(self, JoinOutcome::Submitted | JoinOutcome::Resubmitted)
    }
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub status: JoinStatus,
    pub message: &'static str,
}

impl From<JoinOutcome> for JoinResponse {
    fn from(outcome: JoinOutcome) -> Self {
        Self {
            status: outcome.status(),
            message: outcome.message(),
        }
    }
}

/// Tutor decision on a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Approve,
    Reject,
}

impl Resolution {
    pub fn status(self) -> JoinRequestStatus {
        match self {
            Resolution::Approve => JoinRequestStatus::Approved,
            Resolution::Reject => JoinRequestStatus::Rejected,
        }
    }
}

impl FromStr for Resolution {
    type Err = AppError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "approve" => Ok(Resolution::Approve),
            "reject" => Ok(Resolution::Reject),
            other => Err(AppError::InvalidAction(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveParticipantRequest {
    pub user_id: Option<i64>,
}

/// `{status: ...}` response for membership operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MembershipResponse {
    Approved,
    Rejected,
    Removed,
    Exited,
}

impl From<Resolution> for MembershipResponse {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Approve => MembershipResponse::Approved,
            Resolution::Reject => MembershipResponse::Rejected,
        }
    }
}

/// Lowercase, dash separated, URL-safe slug derived from a community name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Math 101"), "math-101");
        assert_eq!(slugify("  Physics: Waves & Optics! "), "physics-waves-optics");
        assert_eq!(slugify("___"), "");
    }

    #[test]
    fn test_resolution_parsing_rejects_unknown_actions() {
        assert_eq!("approve".parse::<Resolution>().unwrap(), Resolution::Approve);
        assert_eq!("reject".parse::<Resolution>().unwrap(), Resolution::Reject);
        assert!(matches!(
            "ban".parse::<Resolution>(),
            Err(AppError::InvalidAction(a)) if a == "ban"
        ));
    }

    #[test]
    fn test_join_outcome_wire_status() {
        let json = serde_json::to_value(JoinResponse::from(JoinOutcome::AlreadyApproved)).unwrap();
        assert_eq!(json["status"], "approved_already");
        assert_eq!(JoinOutcome::AlreadyPending.status(), JoinStatus::Pending);
        assert!(JoinOutcome::Resubmitted.notifies_tutor());
        assert!(!JoinOutcome::AlreadyPending.notifies_tutor());
    }
}
