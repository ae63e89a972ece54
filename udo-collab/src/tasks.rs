use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use udo_core::{normalize_task_name, Page};

use crate::{
    CollabContext, CollabError, CollabResult, DatabaseResult, NewTask, PrimaryKey, TaskData,
    UpdatedTask,
};

/// Owns task records and answers the today, scheduled and archive views.
#[derive(Clone)]
pub struct TaskStore {
    context: CollabContext,
}

/// The caller-supplied fields of a new task
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub name: String,
    pub due_date: Option<NaiveDate>,
    pub is_private: bool,
}

impl TaskDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            due_date: None,
            is_private: false,
        }
    }
}

impl TaskStore {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a task owned by `owner_id`
    pub async fn create_task(
        &self,
        owner_id: PrimaryKey,
        draft: TaskDraft,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        self.insert(owner_id, draft, None, now).await
    }

    /// Creates a task on a friend's list. The friend must have granted
    /// `assigner_id` permission to create tasks for them.
    pub async fn assign_task(
        &self,
        assigner_id: PrimaryKey,
        owner_id: PrimaryKey,
        draft: TaskDraft,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        let database = &self.context.database;

        if !database.are_friends(owner_id, assigner_id).await? {
            return Err(CollabError::not_authorized(
                "Tasks can only be created for friends",
            ));
        }

        let allowed = database
            .friend_permission(owner_id, assigner_id)
            .await
            .optional()?
            .is_some_and(|p| p.can_create_tasks);

        if !allowed {
            return Err(CollabError::not_authorized(
                "This friend has not allowed you to create tasks for them",
            ));
        }

        let task = self.insert(owner_id, draft, Some(assigner_id), now).await?;
        info!("User {} created task {} for user {}", assigner_id, task.id, owner_id);

        Ok(task)
    }

    pub async fn update_name(
        &self,
        caller_id: PrimaryKey,
        task_id: PrimaryKey,
        name: &str,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        let name = validated_name(name)?;

        self.update_owned(
            caller_id,
            UpdatedTask {
                id: task_id,
                name: Some(name),
                updated_at: now,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn toggle_done(
        &self,
        caller_id: PrimaryKey,
        task_id: PrimaryKey,
        is_done: bool,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        self.update_owned(
            caller_id,
            UpdatedTask {
                id: task_id,
                is_done: Some(is_done),
                updated_at: now,
                ..Default::default()
            },
        )
        .await
    }

    /// Sets or clears the due date
    pub async fn update_due_date(
        &self,
        caller_id: PrimaryKey,
        task_id: PrimaryKey,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        self.update_owned(
            caller_id,
            UpdatedTask {
                id: task_id,
                due_date: Some(due_date),
                updated_at: now,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_privacy(
        &self,
        caller_id: PrimaryKey,
        task_id: PrimaryKey,
        is_private: bool,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        self.update_owned(
            caller_id,
            UpdatedTask {
                id: task_id,
                is_private: Some(is_private),
                updated_at: now,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_task(&self, caller_id: PrimaryKey, task_id: PrimaryKey) -> CollabResult<()> {
        self.owned_task(caller_id, task_id).await?;

        Ok(self.context.database.delete_task(task_id).await?)
    }

    /// Open work that is undated or due by today, plus work finished today
    pub async fn today_tasks(
        &self,
        owner_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> CollabResult<Vec<TaskData>> {
        let window = self.context.config.day_window(now);

        Ok(self.context.database.today_tasks(owner_id, &window).await?)
    }

    /// Open work due after today, soonest first
    pub async fn scheduled_tasks(
        &self,
        owner_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> CollabResult<Vec<TaskData>> {
        let window = self.context.config.day_window(now);

        Ok(self
            .context
            .database
            .scheduled_tasks(owner_id, &window)
            .await?)
    }

    /// Finished work updated at or before `before`, most recent first.
    /// Pages start at 1.
    pub async fn archived_tasks(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
        page: usize,
        page_size: Option<usize>,
    ) -> CollabResult<Vec<TaskData>> {
        let page = Page::new(page, self.context.config.page_size(page_size));

        Ok(self
            .context
            .database
            .archived_tasks(owner_id, before, page)
            .await?)
    }

    pub async fn archived_count(
        &self,
        owner_id: PrimaryKey,
        before: DateTime<Utc>,
    ) -> CollabResult<i64> {
        Ok(self
            .context
            .database
            .count_archived_tasks(owner_id, before)
            .await?)
    }

    /// Deletes all work finished before today. Returns how many tasks were removed.
    pub async fn clear_archived(&self, owner_id: PrimaryKey, now: DateTime<Utc>) -> CollabResult<u64> {
        let window = self.context.config.day_window(now);
        let removed = self
            .context
            .database
            .delete_archived_tasks(owner_id, window.start)
            .await?;

        info!("Cleared {} archived tasks of user {}", removed, owner_id);
        Ok(removed)
    }

    async fn insert(
        &self,
        owner_id: PrimaryKey,
        draft: TaskDraft,
        assigned_by_id: Option<PrimaryKey>,
        now: DateTime<Utc>,
    ) -> CollabResult<TaskData> {
        let name = validated_name(&draft.name)?;

        Ok(self
            .context
            .database
            .create_task(NewTask {
                owner_id,
                name,
                due_date: draft.due_date,
                is_done: false,
                is_private: draft.is_private,
                assigned_by_id,
                created_at: now,
                updated_at: now,
            })
            .await?)
    }

    /// Fetches a task, failing unless the caller owns it
    async fn owned_task(&self, caller_id: PrimaryKey, task_id: PrimaryKey) -> CollabResult<TaskData> {
        let task = self.context.database.task_by_id(task_id).await?;

        if task.owner_id != caller_id {
            return Err(CollabError::not_authorized("Only the owner can change a task"));
        }

        Ok(task)
    }

    async fn update_owned(
        &self,
        caller_id: PrimaryKey,
        updated_task: UpdatedTask,
    ) -> CollabResult<TaskData> {
        self.owned_task(caller_id, updated_task.id).await?;

        Ok(self.context.database.update_task(updated_task).await?)
    }
}

fn validated_name(name: &str) -> CollabResult<String> {
    normalize_task_name(name).ok_or_else(|| CollabError::validation("Task name cannot be empty"))
}

#[cfg(test)]
mod test {
    use chrono::{Duration, NaiveDate};

    use super::{TaskDraft, TaskStore};
    use crate::{testing, CollabError, Database, NewFriendPermission};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn due(name: &str, day: u32) -> TaskDraft {
        TaskDraft {
            due_date: Some(date(day)),
            ..TaskDraft::named(name)
        }
    }

    fn names(tasks: &[crate::TaskData]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;

        let result = tasks
            .create_task(alice.id, TaskDraft::named("   "), testing::now())
            .await;

        assert!(matches!(result, Err(CollabError::Validation(_))));
    }

    #[tokio::test]
    async fn new_tasks_start_open() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let now = testing::now();

        let task = tasks
            .create_task(alice.id, TaskDraft::named("  buy milk "), now)
            .await
            .unwrap();

        assert_eq!(task.name, "buy milk");
        assert!(!task.is_done);
        assert!(!task.is_private);
        assert_eq!(task.created_at, now);
        assert_eq!(task.updated_at, now);
        assert_eq!(task.assigned_by_id, None);
    }

    #[tokio::test]
    async fn buy_milk_moves_from_today_to_archive() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let now = testing::now();

        let milk = tasks
            .create_task(alice.id, TaskDraft::named("buy milk"), now)
            .await
            .unwrap();

        let today = tasks.today_tasks(alice.id, now).await.unwrap();
        assert_eq!(names(&today), vec!["buy milk"]);

        let done_at = now + Duration::hours(1);
        tasks.toggle_done(alice.id, milk.id, true, done_at).await.unwrap();

        let today = tasks.today_tasks(alice.id, done_at).await.unwrap();
        assert_eq!(names(&today), vec!["buy milk"]);

        let tomorrow = now + Duration::days(1);
        assert!(tasks.today_tasks(alice.id, tomorrow).await.unwrap().is_empty());

        let archived = tasks
            .archived_tasks(alice.id, tomorrow, 1, None)
            .await
            .unwrap();
        assert_eq!(names(&archived), vec!["buy milk"]);
        assert_eq!(tasks.archived_count(alice.id, tomorrow).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn today_and_scheduled_views() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let now = testing::now();

        for (draft, offset) in [
            (TaskDraft::named("undated"), 0),
            (due("overdue", 10), 1),
            (due("due today", 20), 2),
            (due("next week", 27), 3),
            (due("tomorrow", 21), 4),
            (due("also tomorrow", 21), 5),
        ] {
            tasks
                .create_task(alice.id, draft, now + Duration::seconds(offset))
                .await
                .unwrap();
        }

        let today = tasks.today_tasks(alice.id, now).await.unwrap();
        assert_eq!(names(&today), vec!["undated", "overdue", "due today"]);

        let scheduled = tasks.scheduled_tasks(alice.id, now).await.unwrap();
        assert_eq!(names(&scheduled), vec!["tomorrow", "also tomorrow", "next week"]);
    }

    #[tokio::test]
    async fn archive_pages_are_disjoint_and_contiguous() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let start = testing::now() - Duration::days(10);

        for i in 0..45 {
            let created = start + Duration::minutes(i);
            let task = tasks
                .create_task(alice.id, TaskDraft::named(format!("task {i}")), created)
                .await
                .unwrap();
            tasks.toggle_done(alice.id, task.id, true, created).await.unwrap();
        }

        let before = testing::now();
        let first = tasks.archived_tasks(alice.id, before, 1, Some(20)).await.unwrap();
        let second = tasks.archived_tasks(alice.id, before, 2, Some(20)).await.unwrap();
        let everything = tasks.archived_tasks(alice.id, before, 1, Some(100)).await.unwrap();

        assert_eq!(first.len(), 20);
        assert_eq!(second.len(), 20);
        assert_eq!(first[0].name, "task 44");

        let joined: Vec<_> = first.iter().chain(second.iter()).cloned().collect();
        assert_eq!(joined, everything[..40].to_vec());
        assert!(joined
            .windows(2)
            .all(|pair| pair[0].updated_at >= pair[1].updated_at));
    }

    #[tokio::test]
    async fn clear_archived_keeps_todays_work() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let now = testing::now();
        let yesterday = now - Duration::days(1);

        let old = tasks
            .create_task(alice.id, TaskDraft::named("old"), yesterday)
            .await
            .unwrap();
        let fresh = tasks
            .create_task(alice.id, TaskDraft::named("fresh"), yesterday)
            .await
            .unwrap();
        tasks
            .create_task(alice.id, TaskDraft::named("open"), yesterday)
            .await
            .unwrap();

        tasks.toggle_done(alice.id, old.id, true, yesterday).await.unwrap();
        tasks.toggle_done(alice.id, fresh.id, true, now).await.unwrap();

        assert_eq!(tasks.clear_archived(alice.id, now).await.unwrap(), 1);

        let today = tasks.today_tasks(alice.id, now).await.unwrap();
        assert_eq!(names(&today), vec!["open", "fresh"]);
    }

    #[tokio::test]
    async fn only_the_owner_can_change_a_task() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let mallory = testing::mock_user(&database, "mallory").await;
        let now = testing::now();

        let task = tasks
            .create_task(alice.id, TaskDraft::named("mine"), now)
            .await
            .unwrap();

        let rename = tasks.update_name(mallory.id, task.id, "yours", now).await;
        let delete = tasks.delete_task(mallory.id, task.id).await;

        assert!(matches!(rename, Err(CollabError::NotAuthorized(_))));
        assert!(matches!(delete, Err(CollabError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn updates_touch_only_their_field() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let now = testing::now();
        let later = now + Duration::minutes(5);

        let task = tasks
            .create_task(alice.id, due("draft", 22), now)
            .await
            .unwrap();

        let renamed = tasks.update_name(alice.id, task.id, "final", later).await.unwrap();
        assert_eq!(renamed.due_date, Some(date(22)));
        assert_eq!(renamed.updated_at, later);

        let private = tasks.update_privacy(alice.id, task.id, true, later).await.unwrap();
        assert!(private.is_private);
        assert_eq!(private.name, "final");

        let undated = tasks.update_due_date(alice.id, task.id, None, later).await.unwrap();
        assert_eq!(undated.due_date, None);
        assert!(undated.is_private);

        tasks.delete_task(alice.id, task.id).await.unwrap();
        assert!(database.task_by_id(task.id).await.is_err());
    }

    #[tokio::test]
    async fn assigning_requires_permission() {
        let (context, database) = testing::context();
        let tasks = TaskStore::new(&context);
        let alice = testing::mock_user(&database, "alice").await;
        let bob = testing::mock_user(&database, "bob").await;
        let now = testing::now();

        let result = tasks
            .assign_task(bob.id, alice.id, TaskDraft::named("call mom"), now)
            .await;
        assert!(matches!(result, Err(CollabError::NotAuthorized(_))));

        database.create_friendship(alice.id, bob.id, now).await.unwrap();

        let result = tasks
            .assign_task(bob.id, alice.id, TaskDraft::named("call mom"), now)
            .await;
        assert!(matches!(result, Err(CollabError::NotAuthorized(_))));

        database
            .set_friend_permission(NewFriendPermission {
                user_id: alice.id,
                friend_id: bob.id,
                can_create_tasks: true,
                now,
            })
            .await
            .unwrap();

        let task = tasks
            .assign_task(bob.id, alice.id, TaskDraft::named("call mom"), now)
            .await
            .unwrap();

        assert_eq!(task.owner_id, alice.id);
        assert_eq!(task.assigned_by_id, Some(bob.id));
    }
}
