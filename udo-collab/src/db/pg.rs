use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, FromRow, PgPool};
use udo_core::{prefix_upper_bound, DayWindow, Page};

use crate::{
    Database, DatabaseError, DatabaseResult, FriendPermissionData, FriendRequestData,
    FriendRequestWithUser, IntoDatabaseError, NewFriendPermission, NewFriendRequest, NewSession,
    NewTask, NewUser, NewVerificationCode, PinnedFriendData, PrimaryKey, RequestStatus, Result,
    SessionData, TaskData, UpdatedTask, UpdatedUser, UserData, VerificationCodeData,
};

const TASK_COLUMNS: &str = "id, owner_id, name, due_date, is_done, is_private, created_at, updated_at, assigned_by_id";

/// A postgres database implementation for U-Do
pub struct PgDatabase {
    pool: PgPool,
}

/// A row joined with the user on the other side of it
#[derive(FromRow)]
struct JoinedUser {
    user_id: PrimaryKey,
    email: String,
    display_name: Option<String>,
    username: Option<String>,
    user_updated_at: DateTime<Utc>,
}

impl From<JoinedUser> for UserData {
    fn from(row: JoinedUser) -> Self {
        UserData {
            id: row.user_id,
            email: row.email,
            display_name: row.display_name,
            username: row.username,
            updated_at: row.user_updated_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: JoinedUser,
}

#[derive(FromRow)]
struct RequestRow {
    #[sqlx(flatten)]
    request: FriendRequestData,
    #[sqlx(flatten)]
    user: JoinedUser,
}

#[derive(FromRow)]
struct PinRow {
    id: PrimaryKey,
    pinned_by: PrimaryKey,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: JoinedUser,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Applies pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }

    async fn pending_requests(
        &self,
        user_id: PrimaryKey,
        mine: &str,
        theirs: &str,
    ) -> Result<Vec<FriendRequestWithUser>> {
        let sql = format!(
            "
            SELECT
                r.*,
                u.id AS user_id,
                u.email,
                u.display_name,
                u.username,
                u.updated_at AS user_updated_at
            FROM friend_requests AS r
                INNER JOIN users AS u ON r.{theirs} = u.id
            WHERE r.{mine} = $1 AND r.status = 'pending'
            ORDER BY r.created_at, r.id"
        );

        let rows: Vec<RequestRow> = query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|r| FriendRequestWithUser {
                request: r.request,
                counterparty: r.user.into(),
            })
            .collect())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn search_users(
        &self,
        prefix: &str,
        exclude_user_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<UserData>> {
        query_as(
            "
            SELECT * FROM users
            WHERE username >= $1 AND username < $2 AND id <> $3
            ORDER BY username
            LIMIT $4",
        )
        .bind(prefix)
        .bind(prefix_upper_bound(prefix))
        .bind(exclude_user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        if let Some(username) = &new_user.username {
            self.user_by_username(username)
                .await
                .conflict_or_ok("user", "username", username)?;
        }

        query_as(
            "
            INSERT INTO users (email, display_name, username, updated_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *",
        )
        .bind(&new_user.email)
        .bind(new_user.display_name)
        .bind(&new_user.username)
        .bind(new_user.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let username_taken = violated_constraint(&e) == Some("users_username_key");

            match &new_user.username {
                Some(username) if username_taken => e.conflict_or("user", "username", username),
                _ => e.conflict_or("user", "email", &new_user.email),
            }
        })
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        if let Some(username) = &updated_user.username {
            match self.user_by_username(username).await.optional()? {
                Some(other) if other.id != user.id => {
                    return Err(DatabaseError::Conflict {
                        resource: "user",
                        field: "username",
                        value: username.clone(),
                    })
                }
                _ => {}
            }
        }

        query_as(
            "
            UPDATE users SET
                display_name = $1,
                username = $2,
                updated_at = $3
            WHERE id = $4
            RETURNING *",
        )
        .bind(updated_user.display_name.or(user.display_name))
        .bind(updated_user.username.as_ref().or(user.username.as_ref()))
        .bind(updated_user.now)
        .bind(updated_user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let username = updated_user.username.as_deref().unwrap_or_default();
            e.conflict_or("user", "username", username)
        })
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row: SessionRow = query_as(
            "
            SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                users.id AS user_id,
                users.email,
                users.display_name,
                users.username,
                users.updated_at AS user_updated_at
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: row.user.into(),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()> {
        query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn verification_code_by_email(&self, email: &str) -> Result<VerificationCodeData> {
        query_as("SELECT email, code_hash, expires_at, attempts FROM verification_codes WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("verification code", "email"))
    }

    async fn upsert_verification_code(&self, new_code: NewVerificationCode) -> Result<()> {
        query(
            "
            INSERT INTO verification_codes (email, code_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET
                code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                attempts = 0",
        )
        .bind(new_code.email)
        .bind(new_code.code_hash)
        .bind(new_code.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn record_verification_attempt(&self, email: &str) -> Result<i32> {
        query_scalar(
            "
            UPDATE verification_codes SET attempts = attempts + 1
            WHERE email = $1
            RETURNING attempts",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("verification code", "email"))
    }

    async fn delete_verification_code(&self, email: &str) -> Result<()> {
        query("DELETE FROM verification_codes WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn task_by_id(&self, task_id: PrimaryKey) -> Result<TaskData> {
        query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("task", "id"))
    }

    async fn find_task(
        &self,
        owner_id: PrimaryKey,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<TaskData> {
        query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = $1 AND name = $2 AND created_at = $3"
        ))
        .bind(owner_id)
        .bind(name)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("task", "owner:name:created_at"))
    }

    async fn create_task(&self, new_task: NewTask) -> Result<TaskData> {
        // Ensure owner exists
        let _ = self.user_by_id(new_task.owner_id).await?;

        query_as(&format!(
            "
            INSERT INTO tasks (owner_id, name, due_date, is_done, is_private, assigned_by_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TASK_COLUMNS}"
        ))
        .bind(new_task.owner_id)
        .bind(new_task.name)
        .bind(new_task.due_date)
        .bind(new_task.is_done)
        .bind(new_task.is_private)
        .bind(new_task.assigned_by_id)
        .bind(new_task.created_at)
        .bind(new_task.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_task(&self, updated_task: UpdatedTask) -> Result<TaskData> {
        let task = self.task_by_id(updated_task.id).await?;

        query_as(&format!(
            "
            UPDATE tasks SET
                name = $1,
                is_done = $2,
                due_date = $3,
                is_private = $4,
                updated_at = $5
            WHERE id = $6
            RETURNING {TASK_COLUMNS}"
        ))
        .bind(updated_task.name.unwrap_or(task.name))
        .bind(updated_task.is_done.unwrap_or(task.is_done))
        .bind(updated_task.due_date.unwrap_or(task.due_date))
        .bind(updated_task.is_private.unwrap_or(task.is_private))
        .bind(updated_task.updated_at)
        .bind(updated_task.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_task(&self, task_id: PrimaryKey) -> Result<()> {
        // Ensure task exists
        let _ = self.task_by_id(task_id).await?;

        query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn today_tasks(&self, owner_id: PrimaryKey, window: &DayWindow) -> Result<Vec<TaskData>> {
        query_as(&format!(
            "
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE owner_id = $1 AND (
                (NOT is_done AND (due_date IS NULL OR due_date <= $2))
                OR (is_done AND updated_at >= $3 AND updated_at < $4)
            )
            ORDER BY is_done, created_at, id"
        ))
        .bind(owner_id)
        .bind(window.today)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn scheduled_tasks(
        &self,
        owner_id: PrimaryKey,
        window: &DayWindow,
    ) -> Result<Vec<TaskData>> {
        query_as(&format!(
            "
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE owner_id = $1 AND NOT is_done AND due_date > $2
            ORDER BY due_date, created_at, id"
        ))
        .bind(owner_id)
        .bind(window.today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<TaskData>> {
        query_as(&format!(
            "
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE owner_id = $1 AND is_done AND updated_at <= $2
            ORDER BY updated_at DESC, id DESC
            LIMIT $3 OFFSET $4"
        ))
        .bind(owner_id)
        .bind(before)
        .bind(page.size as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn count_archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
    ) -> Result<i64> {
        query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE owner_id = $1 AND is_done AND updated_at <= $2",
        )
        .bind(owner_id)
        .bind(before)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
    ) -> Result<u64> {
        query("DELETE FROM tasks WHERE owner_id = $1 AND is_done AND updated_at < $2")
            .bind(owner_id)
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|r| r.rows_affected())
    }

    async fn friend_request_by_id(&self, request_id: PrimaryKey) -> Result<FriendRequestData> {
        query_as("SELECT * FROM friend_requests WHERE id = $1")
            .bind(request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("friend request", "id"))
    }

    async fn friend_request_between(
        &self,
        requester_id: PrimaryKey,
        recipient_id: PrimaryKey,
    ) -> Result<FriendRequestData> {
        query_as("SELECT * FROM friend_requests WHERE requester_id = $1 AND recipient_id = $2")
            .bind(requester_id)
            .bind(recipient_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("friend request", "requester_id:recipient_id"))
    }

    async fn create_friend_request(
        &self,
        new_request: NewFriendRequest,
    ) -> Result<FriendRequestData> {
        self.friend_request_between(new_request.requester_id, new_request.recipient_id)
            .await
            .conflict_or_ok(
                "friend request",
                "requester:recipient",
                &format!("{}:{}", new_request.requester_id, new_request.recipient_id),
            )?;

        query_as(
            "
            INSERT INTO friend_requests (requester_id, recipient_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *",
        )
        .bind(new_request.requester_id)
        .bind(new_request.recipient_id)
        .bind(new_request.status)
        .bind(new_request.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            e.conflict_or(
                "friend request",
                "requester:recipient",
                &format!("{}:{}", new_request.requester_id, new_request.recipient_id),
            )
        })
    }

    async fn update_friend_request_status(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<FriendRequestData> {
        query_as("UPDATE friend_requests SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(status)
            .bind(now)
            .bind(request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("friend request", "id"))
    }

    async fn delete_friend_request(&self, request_id: PrimaryKey) -> Result<()> {
        // Ensure request exists
        let _ = self.friend_request_by_id(request_id).await?;

        query("DELETE FROM friend_requests WHERE id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn incoming_requests(&self, user_id: PrimaryKey) -> Result<Vec<FriendRequestWithUser>> {
        self.pending_requests(user_id, "recipient_id", "requester_id")
            .await
    }

    async fn outgoing_requests(&self, user_id: PrimaryKey) -> Result<Vec<FriendRequestWithUser>> {
        self.pending_requests(user_id, "requester_id", "recipient_id")
            .await
    }

    async fn are_friends(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<bool> {
        query_scalar(
            "SELECT EXISTS (SELECT 1 FROM friendships WHERE user_id = $1 AND friend_id = $2)",
        )
        .bind(user_id)
        .bind(friend_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn list_friends(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        query_as(
            "
            SELECT users.* FROM friendships
                INNER JOIN users ON friendships.friend_id = users.id
            WHERE friendships.user_id = $1
            ORDER BY users.username NULLS LAST, users.email",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_friendship(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO friendships (user_id, friend_id, created_at)
            VALUES ($1, $2, $3), ($2, $1, $3)
            ON CONFLICT (user_id, friend_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(friend_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn delete_friendship(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<()> {
        query("DELETE FROM friendships WHERE user_id = $1 AND friend_id = $2")
            .bind(user_id)
            .bind(friend_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn pinned_friends(&self, user_id: PrimaryKey) -> Result<Vec<PinnedFriendData>> {
        let rows: Vec<PinRow> = query_as(
            "
            SELECT
                pins.id,
                pins.user_id AS pinned_by,
                pins.created_at,
                users.id AS user_id,
                users.email,
                users.display_name,
                users.username,
                users.updated_at AS user_updated_at
            FROM pinned_friends AS pins
                INNER JOIN users ON pins.friend_id = users.id
            WHERE pins.user_id = $1
            ORDER BY pins.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|r| PinnedFriendData {
                id: r.id,
                user_id: r.pinned_by,
                friend: r.user.into(),
                created_at: r.created_at,
            })
            .collect())
    }

    async fn create_pin(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO pinned_friends (user_id, friend_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, friend_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(friend_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn delete_pin(&self, user_id: PrimaryKey, friend_id: PrimaryKey) -> Result<()> {
        query("DELETE FROM pinned_friends WHERE user_id = $1 AND friend_id = $2")
            .bind(user_id)
            .bind(friend_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn friend_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> Result<FriendPermissionData> {
        query_as("SELECT * FROM friend_permissions WHERE user_id = $1 AND friend_id = $2")
            .bind(user_id)
            .bind(friend_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("friend permission", "user_id:friend_id"))
    }

    async fn list_friend_permissions(
        &self,
        user_id: PrimaryKey,
    ) -> Result<Vec<FriendPermissionData>> {
        query_as("SELECT * FROM friend_permissions WHERE user_id = $1 ORDER BY friend_id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn set_friend_permission(
        &self,
        new_permission: NewFriendPermission,
    ) -> Result<FriendPermissionData> {
        query_as(
            "
            INSERT INTO friend_permissions (user_id, friend_id, can_create_tasks, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, friend_id) DO UPDATE SET
                can_create_tasks = EXCLUDED.can_create_tasks,
                updated_at = EXCLUDED.updated_at
            RETURNING *",
        )
        .bind(new_permission.user_id)
        .bind(new_permission.friend_id)
        .bind(new_permission.can_create_tasks)
        .bind(new_permission.now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_friend_permission(
        &self,
        user_id: PrimaryKey,
        friend_id: PrimaryKey,
    ) -> Result<()> {
        query("DELETE FROM friend_permissions WHERE user_id = $1 AND friend_id = $2")
            .bind(user_id)
            .bind(friend_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError {
        match self {
            SqlxError::Database(e) if e.is_unique_violation() => DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            },
            e => Self::any(e),
        }
    }
}

/// The name of the constraint a database error violated, if any
fn violated_constraint(error: &SqlxError) -> Option<&str> {
    error.as_database_error().and_then(|e| e.constraint())
}
