use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::Deserialize;
use udo_core::{normalize_email, normalize_task_name, normalize_username};

use crate::{
    CollabContext, CollabResult, DatabaseError, DatabaseResult, NewFriendPermission,
    NewFriendRequest, NewTask, NewUser, PrimaryKey, RequestStatus, UpdatedTask, UpdatedUser,
};

/// Loads records exported from a previous deployment.
///
/// Every record refers to users by email, and every batch is an upsert on the
/// record's natural key, so a batch can be replayed safely. Records that
/// refer to unknown users, or that would break a uniqueness rule, are skipped.
pub struct Importer {
    context: CollabContext,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedUser {
    pub email: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedTask {
    pub owner_email: String,
    pub name: String,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub assigned_by_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedFriendRequest {
    pub requester_email: String,
    pub recipient_email: String,
    pub status: RequestStatus,
}

/// A friendship or a pin, from `user_email` to `friend_email`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedPair {
    pub user_email: String,
    pub friend_email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedPermission {
    pub user_email: String,
    pub friend_email: String,
    pub can_create_tasks: bool,
}

/// The outcome of an import batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub upserted: usize,
    pub skipped: usize,
}

impl ImportReport {
    fn record(&mut self, upserted: bool) {
        if upserted {
            self.upserted += 1;
        } else {
            self.skipped += 1;
        }
    }

    fn log(self, kind: &str) -> Self {
        info!(
            "Imported {} {}, skipped {}",
            self.upserted, kind, self.skipped
        );
        self
    }
}

impl Importer {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn import_users(
        &self,
        records: Vec<ImportedUser>,
        now: DateTime<Utc>,
    ) -> CollabResult<ImportReport> {
        let database = &self.context.database;
        let mut report = ImportReport::default();

        for record in records {
            let email = normalize_email(&record.email);
            let username = record.username.as_deref().map(normalize_username);

            let existing = database.user_by_email(&email).await.optional()?;

            let result = match existing {
                Some(user) => {
                    database
                        .update_user(UpdatedUser {
                            id: user.id,
                            display_name: record.display_name,
                            username,
                            now,
                        })
                        .await
                }
                None => {
                    database
                        .create_user(NewUser {
                            email: email.clone(),
                            display_name: record.display_name,
                            username,
                            now,
                        })
                        .await
                }
            };

            report.record(skip_conflict(result, &email)?);
        }

        Ok(report.log("users"))
    }

    /// Tasks are matched on owner, name and creation time
    pub async fn import_tasks(
        &self,
        records: Vec<ImportedTask>,
        now: DateTime<Utc>,
    ) -> CollabResult<ImportReport> {
        let database = &self.context.database;
        let mut report = ImportReport::default();

        for record in records {
            let Some(owner_id) = self.user_id(&record.owner_email).await? else {
                report.record(false);
                continue;
            };

            let Some(name) = normalize_task_name(&record.name) else {
                report.record(false);
                continue;
            };

            let assigned_by_id = match &record.assigned_by_email {
                Some(email) => self.user_id(email).await?,
                None => None,
            };

            let updated_at = record.updated_at.unwrap_or(now);

            let existing = database
                .find_task(owner_id, &name, record.created_at)
                .await
                .optional()?;

            match existing {
                Some(task) => {
                    database
                        .update_task(UpdatedTask {
                            id: task.id,
                            is_done: Some(record.is_done),
                            due_date: Some(record.due_date),
                            is_private: Some(record.is_private),
                            updated_at,
                            ..Default::default()
                        })
                        .await?;
                }
                None => {
                    database
                        .create_task(NewTask {
                            owner_id,
                            name,
                            due_date: record.due_date,
                            is_done: record.is_done,
                            is_private: record.is_private,
                            assigned_by_id,
                            created_at: record.created_at,
                            updated_at,
                        })
                        .await?;
                }
            }

            report.record(true);
        }

        Ok(report.log("tasks"))
    }

    /// Friend requests are matched on the ordered pair
    pub async fn import_friend_requests(
        &self,
        records: Vec<ImportedFriendRequest>,
        now: DateTime<Utc>,
    ) -> CollabResult<ImportReport> {
        let database = &self.context.database;
        let mut report = ImportReport::default();

        for record in records {
            let Some((requester_id, recipient_id)) = self
                .pair(&record.requester_email, &record.recipient_email)
                .await?
            else {
                report.record(false);
                continue;
            };

            let existing = database
                .friend_request_between(requester_id, recipient_id)
                .await
                .optional()?;

            match existing {
                Some(request) => {
                    database
                        .update_friend_request_status(request.id, record.status, now)
                        .await?;
                }
                None => {
                    database
                        .create_friend_request(NewFriendRequest {
                            requester_id,
                            recipient_id,
                            status: record.status,
                            now,
                        })
                        .await?;
                }
            }

            report.record(true);
        }

        Ok(report.log("friend requests"))
    }

    /// Each record creates both directions of the friendship
    pub async fn import_friendships(
        &self,
        records: Vec<ImportedPair>,
        now: DateTime<Utc>,
    ) -> CollabResult<ImportReport> {
        let mut report = ImportReport::default();

        for record in records {
            let Some((user_id, friend_id)) =
                self.pair(&record.user_email, &record.friend_email).await?
            else {
                report.record(false);
                continue;
            };

            self.context
                .database
                .create_friendship(user_id, friend_id, now)
                .await?;

            report.record(true);
        }

        Ok(report.log("friendships"))
    }

    pub async fn import_pinned(
        &self,
        records: Vec<ImportedPair>,
        now: DateTime<Utc>,
    ) -> CollabResult<ImportReport> {
        let mut report = ImportReport::default();

        for record in records {
            let Some((user_id, friend_id)) =
                self.pair(&record.user_email, &record.friend_email).await?
            else {
                report.record(false);
                continue;
            };

            self.context
                .database
                .create_pin(user_id, friend_id, now)
                .await?;

            report.record(true);
        }

        Ok(report.log("pins"))
    }

    pub async fn import_perms(
        &self,
        records: Vec<ImportedPermission>,
        now: DateTime<Utc>,
    ) -> CollabResult<ImportReport> {
        let mut report = ImportReport::default();

        for record in records {
            let Some((user_id, friend_id)) =
                self.pair(&record.user_email, &record.friend_email).await?
            else {
                report.record(false);
                continue;
            };

            self.context
                .database
                .set_friend_permission(NewFriendPermission {
                    user_id,
                    friend_id,
                    can_create_tasks: record.can_create_tasks,
                    now,
                })
                .await?;

            report.record(true);
        }

        Ok(report.log("permissions"))
    }

    async fn user_id(&self, email: &str) -> CollabResult<Option<PrimaryKey>> {
        let user = self
            .context
            .database
            .user_by_email(&normalize_email(email))
            .await
            .optional()?;

        Ok(user.map(|u| u.id))
    }

    /// Resolves both emails, or None if either user is unknown or they are the same user
    async fn pair(
        &self,
        user_email: &str,
        friend_email: &str,
    ) -> CollabResult<Option<(PrimaryKey, PrimaryKey)>> {
        let user_id = self.user_id(user_email).await?;
        let friend_id = self.user_id(friend_email).await?;

        Ok(match (user_id, friend_id) {
            (Some(a), Some(b)) if a != b => Some((a, b)),
            _ => None,
        })
    }
}

/// Turns a uniqueness conflict into a skipped record
fn skip_conflict<T>(result: Result<T, DatabaseError>, key: &str) -> CollabResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(DatabaseError::Conflict { resource, field, .. }) => {
            warn!("Skipping {}: {} {} is already taken", key, resource, field);
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}
