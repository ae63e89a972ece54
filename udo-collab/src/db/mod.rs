use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use udo_core::{DayWindow, Page};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    /// Turns a unique constraint violation into a conflict error
    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str)
        -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult<T> {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;

    /// Turns a not found error into None
    fn optional(self) -> Result<Option<T>>;
}

impl<T> DatabaseResult<T> for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can fetch U-Do data from a database.
///
/// Deletes that back a cascade (friendship edges, pins, permissions) are
/// idempotent: deleting an absent row succeeds.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    /// Users whose username starts with `prefix`, ordered by username
    async fn search_users(
        &self,
        prefix: &str,
        exclude_user_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<UserData>>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()>;

    async fn verification_code_by_email(&self, email: &str) -> Result<VerificationCodeData>;
    /// Stores a code, replacing any earlier code for the same email
    async fn upsert_verification_code(&self, new_code: NewVerificationCode) -> Result<()>;
    /// Counts a verification attempt against the email's code, returning the new total
    async fn record_verification_attempt(&self, email: &str) -> Result<i32>;
    async fn delete_verification_code(&self, email: &str) -> Result<()>;

    async fn task_by_id(&self, task_id: PrimaryKey) -> Result<TaskData>;
    /// Looks a task up by its natural key
    async fn find_task(
        &self,
        owner_id: PrimaryKey,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<TaskData>;
    async fn create_task(&self, new_task: NewTask) -> Result<TaskData>;
    async fn update_task(&self, updated_task: UpdatedTask) -> Result<TaskData>;
    async fn delete_task(&self, task_id: PrimaryKey) -> Result<()>;
    /// Open tasks first, each group in creation order
    async fn today_tasks(&self, owner_id: PrimaryKey, window: &DayWindow) -> Result<Vec<TaskData>>;
    /// By due date, then creation order
    async fn scheduled_tasks(
        &self,
        owner_id: PrimaryKey,
        window: &DayWindow,
    ) -> Result<Vec<TaskData>>;
    /// Most recently finished first
    async fn archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<TaskData>>;
    async fn count_archived_tasks(&self, owner_id: PrimaryKey, before: DateTime<Utc>)
        -> Result<i64>;
    /// Deletes finished tasks last updated strictly before `before`, returning how many
    async fn delete_archived_tasks(&self, owner_id: PrimaryKey, before: DateTime<Utc>)
        -> Result<u64>;

    async fn friend_request_by_id(&self, request_id: PrimaryKey) -> Result<FriendRequestData>;
    /// The request sent by `requester_id` to `recipient_id`, in that direction only
    async fn friend_request_between(
        &self,
        requester_id: PrimaryKey,
        recipient_id: PrimaryKey,
    ) -> Result<FriendRequestData>;
    async fn create_friend_request(
        &self,
        new_request: NewFriendRequest,
    ) -> Result<FriendRequestData>;
    async fn update_friend_request_status(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<FriendRequestData>;
    async fn delete_friend_request(&self, request_id: PrimaryKey) -> Result<()>;
    /// Pending requests where the user is the recipient
    async fn incoming_requests(&self, user_id: PrimaryKey) -> Result<Vec<FriendRequestWithUser>>;
    /// Pending requests where the user is the requester
    async fn outgoing_requests(&self, user_id: PrimaryKey) -> Result<Vec<FriendRequestWithUser>>;

    async fn are_friends(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<bool>;
    /// Friends of the user, ordered by username
    async fn list_friends(&self, user_id: PrimaryKey) -> Result<Vec<UserData>>;
    /// Creates both directions of a friendship
    async fn create_friendship(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<()>;
    /// Deletes one direction of a friendship
    async fn delete_friendship(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<()>;

    /// Pinned friends in the order they were pinned
    async fn pinned_friends(&self, user_id: PrimaryKey) -> Result<Vec<PinnedFriendData>>;
    async fn create_pin(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn delete_pin(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<()>;

    async fn friend_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> Result<FriendPermissionData>;
    async fn list_friend_permissions(&self, user_id: PrimaryKey)
        -> Result<Vec<FriendPermissionData>>;
    async fn set_friend_permission(
        &self,
        new_permission: NewFriendPermission,
    ) -> Result<FriendPermissionData>;
    async fn delete_friend_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewVerificationCode {
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner_id: PrimaryKey,
    pub name: String,
    pub due_date: Option<NaiveDate>,
    pub is_done: bool,
    pub is_private: bool,
    pub assigned_by_id: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A partial task update. Only fields that are Some are written.
#[derive(Debug, Clone, Default)]
pub struct UpdatedTask {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub is_done: Option<bool>,
    /// `Some(None)` clears the due date
    pub due_date: Option<Option<NaiveDate>>,
    pub is_private: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFriendRequest {
    pub requester_id: PrimaryKey,
    pub recipient_id: PrimaryKey,
    pub status: RequestStatus,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFriendPermission {
    pub user_id: PrimaryKey,
    pub friend_id: PrimaryKey,
    pub can_create_tasks: bool,
    pub now: DateTime<Utc>,
}
