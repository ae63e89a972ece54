use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use udo_core::{TaskCategory, TaskState};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A U-Do account
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserData {
    pub id: PrimaryKey,
    /// Unique, always lowercase
    pub email: String,
    pub display_name: Option<String>,
    /// Unique, always lowercase when set
    pub username: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A pending email verification
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCodeData {
    pub email: String,
    /// Argon2 hash of the code that was sent out
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    /// Verifications attempted against this code so far
    pub attempts: i32,
}

/// A to-do item
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TaskData {
    pub id: PrimaryKey,
    pub owner_id: PrimaryKey,
    pub name: String,
    /// A date without a time component
    pub due_date: Option<NaiveDate>,
    pub is_done: bool,
    /// Private tasks are never shown to anyone but the owner
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The friend who created this task on the owner's behalf, if any.
    /// Informational only, ownership stays with the owner.
    pub assigned_by_id: Option<PrimaryKey>,
}

impl TaskData {
    pub fn state(&self) -> TaskState {
        TaskState {
            is_done: self.is_done,
            due_date: self.due_date,
            updated_at: self.updated_at,
        }
    }

    pub fn category(&self, today: NaiveDate) -> TaskCategory {
        TaskCategory::of(self.due_date, today)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "friend_request_status", rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

/// A friend request. Unique per (requester, recipient).
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FriendRequestData {
    pub id: PrimaryKey,
    pub requester_id: PrimaryKey,
    pub recipient_id: PrimaryKey,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A friend request joined with the user on the other side of it
#[derive(Debug, Clone)]
pub struct FriendRequestWithUser {
    pub request: FriendRequestData,
    pub counterparty: UserData,
}

/// A friend whose tasks a user wants on their dashboard
#[derive(Debug, Clone)]
pub struct PinnedFriendData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub friend: UserData,
    pub created_at: DateTime<Utc>,
}

/// Grants `friend_id` the right to create tasks owned by `user_id`
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FriendPermissionData {
    pub user_id: PrimaryKey,
    pub friend_id: PrimaryKey,
    pub can_create_tasks: bool,
    pub updated_at: DateTime<Utc>,
}
