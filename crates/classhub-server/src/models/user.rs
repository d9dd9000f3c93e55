use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Community;

/// Role carried in access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tutor,
    Student,
    #[default]
    Other,
}

/// Minimal view of an account owned by the external user service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Authenticated caller, resolved once from token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Tutor(UserRef),
    Student(UserRef),
    Other(UserRef),
}

impl Identity {
    pub fn new(role: Role, user: UserRef) -> Self {
        match role {
            Role::Tutor => Identity::Tutor(user),
            Role::Student => Identity::Student(user),
            Role::Other => Identity::Other(user),
        }
    }

    pub fn user(&self) -> &UserRef {
        match self {
            Identity::Tutor(user) | Identity::Student(user) | Identity::Other(user) => user,
        }
    }

    pub fn id(&self) -> i64 {
        self.user().id
    }

    /// True only for the tutor who owns `community`.
    pub fn owns(&self, community: &Community) -> bool {
        matches!(self, Identity::Tutor(user) if user.id == community.tutor_id)
    }
}
