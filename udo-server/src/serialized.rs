//! All schemas that are exposed from endpoints are defined here
//! along with the From<T> impls

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use udo_collab::{
    FriendPermissionData, FriendRequestData, FriendRequestWithUser, ImportReport,
    PinnedFriendTasks as CollabPinnedFriendTasks, RequestStatus, SessionData, TaskData, UserData,
};
use udo_core::TaskCategory;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    email: String,
    username: Option<String>,
    display_name: Option<String>,
}

/// A user as seen by other users
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    id: i32,
    username: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Overdue,
    Today,
    Later,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: i32,
    owner_id: i32,
    name: String,
    due_date: Option<NaiveDate>,
    is_done: bool,
    is_private: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    assigned_by_id: Option<i32>,
    category: Category,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum FriendRequestState {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    id: i32,
    requester_id: i32,
    recipient_id: i32,
    status: FriendRequestState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A pending request along with the other party
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestEntry {
    request: FriendRequest,
    user: PublicUser,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequests {
    incoming: Vec<FriendRequestEntry>,
    outgoing: Vec<FriendRequestEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendPermission {
    friend_id: i32,
    can_create_tasks: bool,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PinnedFriendTasks {
    friend_id: i32,
    friend_username: Option<String>,
    friend_display_name: Option<String>,
    tasks: Vec<Task>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedCount {
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearedArchive {
    pub deleted: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    upserted: usize,
    skipped: usize,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<PublicUser> for UserData {
    fn to_serialized(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            expires_at: self.expires_at,
            user: self.user.to_serialized(),
        }
    }
}

/// Tasks need to know what day it is to be categorized
impl ToSerialized<Task> for (&TaskData, NaiveDate) {
    fn to_serialized(&self) -> Task {
        let (task, today) = *self;

        let category = match task.category(today) {
            TaskCategory::Overdue => Category::Overdue,
            TaskCategory::Today => Category::Today,
            TaskCategory::Later => Category::Later,
        };

        Task {
            id: task.id,
            owner_id: task.owner_id,
            name: task.name.clone(),
            due_date: task.due_date,
            is_done: task.is_done,
            is_private: task.is_private,
            created_at: task.created_at,
            updated_at: task.updated_at,
            assigned_by_id: task.assigned_by_id,
            category,
        }
    }
}

pub fn tasks_on(tasks: &[TaskData], today: NaiveDate) -> Vec<Task> {
    tasks.iter().map(|t| (t, today).to_serialized()).collect()
}

impl ToSerialized<FriendRequest> for FriendRequestData {
    fn to_serialized(&self) -> FriendRequest {
        let status = match self.status {
            RequestStatus::Pending => FriendRequestState::Pending,
            RequestStatus::Accepted => FriendRequestState::Accepted,
            RequestStatus::Declined => FriendRequestState::Declined,
        };

        FriendRequest {
            id: self.id,
            requester_id: self.requester_id,
            recipient_id: self.recipient_id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ToSerialized<FriendRequestEntry> for FriendRequestWithUser {
    fn to_serialized(&self) -> FriendRequestEntry {
        FriendRequestEntry {
            request: self.request.to_serialized(),
            user: self.counterparty.to_serialized(),
        }
    }
}

impl ToSerialized<FriendRequests> for udo_collab::FriendRequests {
    fn to_serialized(&self) -> FriendRequests {
        FriendRequests {
            incoming: self.incoming.to_serialized(),
            outgoing: self.outgoing.to_serialized(),
        }
    }
}

impl ToSerialized<FriendPermission> for FriendPermissionData {
    fn to_serialized(&self) -> FriendPermission {
        FriendPermission {
            friend_id: self.friend_id,
            can_create_tasks: self.can_create_tasks,
            updated_at: Some(self.updated_at),
        }
    }
}

impl FriendPermission {
    /// The answer when no permission has ever been set
    pub fn from_flag(friend_id: i32, can_create_tasks: bool) -> Self {
        Self {
            friend_id,
            can_create_tasks,
            updated_at: None,
        }
    }
}

impl PinnedFriendTasks {
    pub fn on(entry: &CollabPinnedFriendTasks, today: NaiveDate) -> Self {
        Self {
            friend_id: entry.friend_id,
            friend_username: entry.friend_username.clone(),
            friend_display_name: entry.friend_display_name.clone(),
            tasks: tasks_on(&entry.tasks, today),
        }
    }
}

impl ToSerialized<ImportResult> for ImportReport {
    fn to_serialized(&self) -> ImportResult {
        ImportResult {
            upserted: self.upserted,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;
    use udo_collab::TaskData;

    use super::{tasks_on, ToSerialized};

    #[test]
    fn tasks_carry_their_category() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();

        let task = |id, due_date| TaskData {
            id,
            owner_id: 1,
            name: "Buy milk".to_string(),
            due_date,
            is_done: false,
            is_private: false,
            created_at: now,
            updated_at: now,
            assigned_by_id: None,
        };

        let tasks = vec![
            task(1, today.pred_opt()),
            task(2, Some(today)),
            task(3, None),
        ];

        let serialized = serde_json::to_value(tasks_on(&tasks, today)).unwrap();
        let categories: Vec<_> = serialized
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["category"].clone())
            .collect();

        assert_eq!(categories, vec![json!("overdue"), json!("today"), json!("later")]);
        assert_eq!(serialized[1]["dueDate"], json!("2024-05-20"));

        let single = (&tasks[0], today).to_serialized();
        assert_eq!(serde_json::to_value(single).unwrap()["ownerId"], json!(1));
    }
}
