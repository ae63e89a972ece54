use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use udo_core::{prefix_upper_bound, DayWindow, Page};

use crate::{
    Database, DatabaseError, DatabaseResult, FriendPermissionData, FriendRequestData,
    FriendRequestWithUser, NewFriendPermission, NewFriendRequest, NewSession, NewTask, NewUser,
    NewVerificationCode, PinnedFriendData, PrimaryKey, RequestStatus, Result, SessionData, TaskData,
    UpdatedTask, UpdatedUser, UserData, VerificationCodeData,
};

/// An in-memory database, used for tests and when no database is configured.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
    sessions: DashMap<String, SessionRow>,
    codes: DashMap<String, VerificationCodeData>,
    /// Owners whose task reads fail, to exercise degraded paths
    #[cfg(test)]
    unavailable_owners: dashmap::DashSet<PrimaryKey>,
}

#[derive(Default)]
struct Tables {
    last_id: PrimaryKey,
    users: Vec<UserData>,
    tasks: Vec<TaskData>,
    requests: Vec<FriendRequestData>,
    friendships: Vec<(PrimaryKey, PrimaryKey)>,
    pins: Vec<PinRow>,
    permissions: Vec<FriendPermissionData>,
}

struct PinRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    friend_id: PrimaryKey,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
struct SessionRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

impl Tables {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    fn username_taken_by_other(&self, username: &str, user_id: Option<PrimaryKey>) -> bool {
        self.users
            .iter()
            .any(|u| u.username.as_deref() == Some(username) && Some(u.id) != user_id)
    }

    fn task_mut(&mut self, task_id: PrimaryKey) -> Result<&mut TaskData> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(DatabaseError::NotFound {
                resource: "task",
                identifier: "id",
            })
    }

    fn owned_tasks(&self, owner_id: PrimaryKey) -> impl Iterator<Item = &TaskData> {
        self.tasks.iter().filter(move |t| t.owner_id == owner_id)
    }

    fn pending_requests_with<F>(&self, filter: F) -> Result<Vec<FriendRequestWithUser>>
    where
        F: Fn(&FriendRequestData) -> Option<PrimaryKey>,
    {
        let mut requests = self
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .filter_map(|r| filter(r).map(|counterparty| (r, counterparty)))
            .map(|(r, counterparty)| {
                Ok(FriendRequestWithUser {
                    request: r.clone(),
                    counterparty: self.user(counterparty)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        requests.sort_by_key(|r| (r.request.created_at, r.request.id));
        Ok(requests)
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn make_unavailable(&self, owner_id: PrimaryKey) {
        self.unavailable_owners.insert(owner_id);
    }

    #[cfg(test)]
    fn ensure_available(&self, owner_id: PrimaryKey) -> Result<()> {
        use std::io;

        if self.unavailable_owners.contains(&owner_id) {
            return Err(DatabaseError::Internal(Box::new(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("tasks of user {owner_id} are unavailable"),
            ))));
        }

        Ok(())
    }
}

/// Sorts users by username, placing users without one last
fn by_username(a: &UserData, b: &UserData) -> Ordering {
    match (&a.username, &b.username) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.email.cmp(&b.email),
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.tables.lock().user(user_id)
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.tables
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "email",
            })
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.tables
            .lock()
            .users
            .iter()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn search_users(
        &self,
        prefix: &str,
        exclude_user_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<UserData>> {
        let upper = prefix_upper_bound(prefix);
        let tables = self.tables.lock();

        let mut users: Vec<_> = tables
            .users
            .iter()
            .filter(|u| u.id != exclude_user_id)
            .filter(|u| {
                u.username
                    .as_deref()
                    .is_some_and(|name| name >= prefix && name < upper.as_str())
            })
            .cloned()
            .collect();

        users.sort_by(by_username);
        users.truncate(limit);

        Ok(users)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut tables = self.tables.lock();

        if tables.users.iter().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "email",
                value: new_user.email,
            });
        }

        if let Some(username) = &new_user.username {
            if tables.username_taken_by_other(username, None) {
                return Err(DatabaseError::Conflict {
                    resource: "user",
                    field: "username",
                    value: username.clone(),
                });
            }
        }

        let user = UserData {
            id: tables.next_id(),
            email: new_user.email,
            display_name: new_user.display_name,
            username: new_user.username,
            updated_at: new_user.now,
        };

        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut tables = self.tables.lock();

        if let Some(username) = &updated_user.username {
            if tables.username_taken_by_other(username, Some(updated_user.id)) {
                return Err(DatabaseError::Conflict {
                    resource: "user",
                    field: "username",
                    value: username.clone(),
                });
            }
        }

        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == updated_user.id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        if let Some(display_name) = updated_user.display_name {
            user.display_name = Some(display_name);
        }

        if let Some(username) = updated_user.username {
            user.username = Some(username);
        }

        user.updated_at = updated_user.now;
        Ok(user.clone())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = self
            .sessions
            .get(token)
            .map(|r| r.value().clone())
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        Ok(SessionData {
            id: row.id,
            token: token.to_string(),
            expires_at: row.expires_at,
            user: self.user_by_id(row.user_id).await?,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let row = SessionRow {
            id: self.tables.lock().next_id(),
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        };

        self.sessions.insert(new_session.token.clone(), row);
        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        self.sessions
            .remove(token)
            .map(|_| ())
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()> {
        self.sessions.retain(|_, row| row.expires_at > now);
        Ok(())
    }

    async fn verification_code_by_email(&self, email: &str) -> Result<VerificationCodeData> {
        self.codes
            .get(email)
            .map(|c| c.value().clone())
            .ok_or(DatabaseError::NotFound {
                resource: "verification code",
                identifier: "email",
            })
    }

    async fn upsert_verification_code(&self, new_code: NewVerificationCode) -> Result<()> {
        self.codes.insert(
            new_code.email.clone(),
            VerificationCodeData {
                email: new_code.email,
                code_hash: new_code.code_hash,
                expires_at: new_code.expires_at,
                attempts: 0,
            },
        );

        Ok(())
    }

    async fn record_verification_attempt(&self, email: &str) -> Result<i32> {
        let mut code = self.codes.get_mut(email).ok_or(DatabaseError::NotFound {
            resource: "verification code",
            identifier: "email",
        })?;

        code.attempts += 1;
        Ok(code.attempts)
    }

    async fn delete_verification_code(&self, email: &str) -> Result<()> {
        self.codes.remove(email);
        Ok(())
    }

    async fn task_by_id(&self, task_id: PrimaryKey) -> Result<TaskData> {
        self.tables.lock().task_mut(task_id).map(|t| t.clone())
    }

    async fn find_task(
        &self,
        owner_id: PrimaryKey,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<TaskData> {
        self.tables
            .lock()
            .owned_tasks(owner_id)
            .find(|t| t.name == name && t.created_at == created_at)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "task",
                identifier: "owner:name:created_at",
            })
    }

    async fn create_task(&self, new_task: NewTask) -> Result<TaskData> {
        let mut tables = self.tables.lock();
        tables.user(new_task.owner_id)?;

        let task = TaskData {
            id: tables.next_id(),
            owner_id: new_task.owner_id,
            name: new_task.name,
            due_date: new_task.due_date,
            is_done: new_task.is_done,
            is_private: new_task.is_private,
            created_at: new_task.created_at,
            updated_at: new_task.updated_at,
            assigned_by_id: new_task.assigned_by_id,
        };

        tables.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, updated_task: UpdatedTask) -> Result<TaskData> {
        let mut tables = self.tables.lock();
        let task = tables.task_mut(updated_task.id)?;

        if let Some(name) = updated_task.name {
            task.name = name;
        }
        if let Some(is_done) = updated_task.is_done {
            task.is_done = is_done;
        }
        if let Some(due_date) = updated_task.due_date {
            task.due_date = due_date;
        }
        if let Some(is_private) = updated_task.is_private {
            task.is_private = is_private;
        }

        task.updated_at = updated_task.updated_at;
        Ok(task.clone())
    }

    async fn delete_task(&self, task_id: PrimaryKey) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.task_mut(task_id)?;
        tables.tasks.retain(|t| t.id != task_id);

        Ok(())
    }

    async fn today_tasks(&self, owner_id: PrimaryKey, window: &DayWindow) -> Result<Vec<TaskData>> {
        #[cfg(test)]
        self.ensure_available(owner_id)?;

        let mut tasks: Vec<_> = self
            .tables
            .lock()
            .owned_tasks(owner_id)
            .filter(|t| t.state().in_today_view(window))
            .cloned()
            .collect();

        tasks.sort_by_key(|t| (t.is_done, t.created_at, t.id));
        Ok(tasks)
    }

    async fn scheduled_tasks(
        &self,
        owner_id: PrimaryKey,
        window: &DayWindow,
    ) -> Result<Vec<TaskData>> {
        #[cfg(test)]
        self.ensure_available(owner_id)?;

        let mut tasks: Vec<_> = self
            .tables
            .lock()
            .owned_tasks(owner_id)
            .filter(|t| t.state().in_scheduled_view(window))
            .cloned()
            .collect();

        tasks.sort_by_key(|t| (t.due_date, t.created_at, t.id));
        Ok(tasks)
    }

    async fn archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<TaskData>> {
        let mut tasks: Vec<_> = self
            .tables
            .lock()
            .owned_tasks(owner_id)
            .filter(|t| t.state().is_archived(before))
            .cloned()
            .collect();

        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(page.slice(tasks))
    }

    async fn count_archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
    ) -> Result<i64> {
        let count = self
            .tables
            .lock()
            .owned_tasks(owner_id)
            .filter(|t| t.state().is_archived(before))
            .count();

        Ok(count as i64)
    }

    async fn delete_archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tables = self.tables.lock();
        let count_before = tables.tasks.len();

        tables
            .tasks
            .retain(|t| !(t.owner_id == owner_id && t.is_done && t.updated_at < before));

        Ok((count_before - tables.tasks.len()) as u64)
    }

    async fn friend_request_by_id(&self, request_id: PrimaryKey) -> Result<FriendRequestData> {
        self.tables
            .lock()
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "friend request",
                identifier: "id",
            })
    }

    async fn friend_request_between(
        &self,
        requester_id: PrimaryKey,
        recipient_id: PrimaryKey,
    ) -> Result<FriendRequestData> {
        self.tables
            .lock()
            .requests
            .iter()
            .find(|r| r.requester_id == requester_id && r.recipient_id == recipient_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "friend request",
                identifier: "requester_id:recipient_id",
            })
    }

    async fn create_friend_request(
        &self,
        new_request: NewFriendRequest,
    ) -> Result<FriendRequestData> {
        let mut tables = self.tables.lock();

        if tables.requests.iter().any(|r| {
            r.requester_id == new_request.requester_id && r.recipient_id == new_request.recipient_id
        }) {
            return Err(DatabaseError::Conflict {
                resource: "friend request",
                field: "requester:recipient",
                value: format!("{}:{}", new_request.requester_id, new_request.recipient_id),
            });
        }

        tables.user(new_request.requester_id)?;
        tables.user(new_request.recipient_id)?;

        let request = FriendRequestData {
            id: tables.next_id(),
            requester_id: new_request.requester_id,
            recipient_id: new_request.recipient_id,
            status: new_request.status,
            created_at: new_request.now,
            updated_at: new_request.now,
        };

        tables.requests.push(request.clone());
        Ok(request)
    }

    async fn update_friend_request_status(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<FriendRequestData> {
        let mut tables = self.tables.lock();
        let request = tables
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(DatabaseError::NotFound {
                resource: "friend request",
                identifier: "id",
            })?;

        request.status = status;
        request.updated_at = now;

        Ok(request.clone())
    }

    async fn delete_friend_request(&self, request_id: PrimaryKey) -> Result<()> {
        let _ = self.friend_request_by_id(request_id).await?;

        self.tables.lock().requests.retain(|r| r.id != request_id);
        Ok(())
    }

    async fn incoming_requests(&self, user_id: PrimaryKey) -> Result<Vec<FriendRequestWithUser>> {
        self.tables
            .lock()
            .pending_requests_with(|r| (r.recipient_id == user_id).then_some(r.requester_id))
    }

    async fn outgoing_requests(&self, user_id: PrimaryKey) -> Result<Vec<FriendRequestWithUser>> {
        self.tables
            .lock()
            .pending_requests_with(|r| (r.requester_id == user_id).then_some(r.recipient_id))
    }

    async fn are_friends(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .friendships
            .contains(&(user_id, friend_id)))
    }

    async fn list_friends(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        let tables = self.tables.lock();

        let mut friends = tables
            .friendships
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, friend)| tables.user(*friend))
            .collect::<Result<Vec<_>>>()?;

        friends.sort_by(by_username);
        Ok(friends)
    }

    async fn create_friendship(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock();

        for edge in [(user_id, friend_id), (friend_id, user_id)] {
            if !tables.friendships.contains(&edge) {
                tables.friendships.push(edge);
            }
        }

        Ok(())
    }

    async fn delete_friendship(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<()> {
        self.tables
            .lock()
            .friendships
            .retain(|edge| *edge != (user_id, friend_id));

        Ok(())
    }

    async fn pinned_friends(&self, user_id: PrimaryKey) -> Result<Vec<PinnedFriendData>> {
        let tables = self.tables.lock();

        let mut pins = tables
            .pins
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| {
                Ok(PinnedFriendData {
                    id: p.id,
                    user_id: p.user_id,
                    friend: tables.user(p.friend_id)?,
                    created_at: p.created_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        pins.sort_by_key(|p| p.id);
        Ok(pins)
    }

    async fn create_pin(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock();
        let exists = tables
            .pins
            .iter()
            .any(|p| p.user_id == user_id && p.friend_id == friend_id);

        if !exists {
            let id = tables.next_id();
            tables.pins.push(PinRow {
                id,
                user_id,
                friend_id,
                created_at: now,
            });
        }

        Ok(())
    }

    async fn delete_pin(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<()> {
        self.tables
            .lock()
            .pins
            .retain(|p| !(p.user_id == user_id && p.friend_id == friend_id));

        Ok(())
    }

    async fn friend_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> Result<FriendPermissionData> {
        self.tables
            .lock()
            .permissions
            .iter()
            .find(|p| p.user_id == user_id && p.friend_id == friend_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "friend permission",
                identifier: "user_id:friend_id",
            })
    }

    async fn list_friend_permissions(
        &self,
        user_id: PrimaryKey,
    ) -> Result<Vec<FriendPermissionData>> {
        let mut permissions: Vec<_> = self
            .tables
            .lock()
            .permissions
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();

        permissions.sort_by_key(|p| p.friend_id);
        Ok(permissions)
    }

    async fn set_friend_permission(
        &self,
        new_permission: NewFriendPermission,
    ) -> Result<FriendPermissionData> {
        let mut tables = self.tables.lock();
        let NewFriendPermission {
            user_id,
            friend_id,
            can_create_tasks,
            now,
        } = new_permission;

        let permission = FriendPermissionData {
            user_id,
            friend_id,
            can_create_tasks,
            updated_at: now,
        };

        match tables
            .permissions
            .iter_mut()
            .find(|p| p.user_id == user_id && p.friend_id == friend_id)
        {
            Some(existing) => *existing = permission.clone(),
            None => tables.permissions.push(permission.clone()),
        }

        Ok(permission)
    }

    async fn delete_friend_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> Result<()> {
        self.tables
            .lock()
            .permissions
            .retain(|p| !(p.user_id == user_id && p.friend_id == friend_id));

        Ok(())
    }
}
