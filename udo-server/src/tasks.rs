use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
    Json,
};
use chrono::{NaiveDate, Utc};
use udo_collab::{TaskData, TaskDraft};

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{
        ArchiveQuery, AssignTaskSchema, NewTaskSchema, TaskDoneSchema, TaskDueDateSchema,
        TaskNameSchema, TaskPrivacySchema, ValidatedJson,
    },
    serialized::{tasks_on, ArchivedCount, ClearedArchive, Task, ToSerialized},
    Router, ServerContext,
};

impl ServerContext {
    /// The current day, in the configured offset
    pub(crate) fn today(&self) -> NaiveDate {
        self.collab.config().day_window(Utc::now()).today
    }

    fn task(&self, task: TaskData) -> Json<Task> {
        Json((&task, self.today()).to_serialized())
    }
}

#[utoipa::path(
    post,
    path = "/v1/tasks",
    tag = "tasks",
    request_body = NewTaskSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Task),
        (status = 400, description = "The name is empty")
    )
)]
async fn create_task(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewTaskSchema>,
) -> ServerResult<Json<Task>> {
    let draft = TaskDraft {
        name: body.name,
        due_date: body.due_date,
        is_private: body.is_private,
    };

    let task = context
        .collab
        .tasks
        .create_task(session.user_id(), draft, Utc::now())
        .await?;

    Ok(context.task(task))
}

#[utoipa::path(
    post,
    path = "/v1/tasks/assign",
    tag = "tasks",
    request_body = AssignTaskSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Task),
        (status = 403, description = "The owner is not a friend, or has not allowed this"),
        (status = 404, description = "No user has this username")
    )
)]
async fn assign_task(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<AssignTaskSchema>,
) -> ServerResult<Json<Task>> {
    let owner = context
        .collab
        .users
        .require_by_username(&body.owner_username)
        .await?;

    let draft = TaskDraft {
        name: body.name,
        due_date: body.due_date,
        is_private: body.is_private,
    };

    let task = context
        .collab
        .tasks
        .assign_task(session.user_id(), owner.id, draft, Utc::now())
        .await?;

    Ok(context.task(task))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/today",
    tag = "tasks",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Task>)
    )
)]
async fn today(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Task>>> {
    let tasks = context
        .collab
        .tasks
        .today_tasks(session.user_id(), Utc::now())
        .await?;

    Ok(Json(tasks_on(&tasks, context.today())))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/scheduled",
    tag = "tasks",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Task>)
    )
)]
async fn scheduled(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Task>>> {
    let tasks = context
        .collab
        .tasks
        .scheduled_tasks(session.user_id(), Utc::now())
        .await?;

    Ok(Json(tasks_on(&tasks, context.today())))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/archived",
    tag = "tasks",
    params(ArchiveQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Task>)
    )
)]
async fn archived(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<ArchiveQuery>,
) -> ServerResult<Json<Vec<Task>>> {
    let tasks = context
        .collab
        .tasks
        .archived_tasks(
            session.user_id(),
            query.before.unwrap_or_else(Utc::now),
            query.page.unwrap_or(1),
            query.page_size,
        )
        .await?;

    Ok(Json(tasks_on(&tasks, context.today())))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/archived/count",
    tag = "tasks",
    params(ArchiveQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ArchivedCount)
    )
)]
async fn archived_count(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<ArchiveQuery>,
) -> ServerResult<Json<ArchivedCount>> {
    let count = context
        .collab
        .tasks
        .archived_count(session.user_id(), query.before.unwrap_or_else(Utc::now))
        .await?;

    Ok(Json(ArchivedCount { count }))
}

#[utoipa::path(
    delete,
    path = "/v1/tasks/archived",
    tag = "tasks",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ClearedArchive, description = "Tasks finished before today were deleted")
    )
)]
async fn clear_archived(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<ClearedArchive>> {
    let deleted = context
        .collab
        .tasks
        .clear_archived(session.user_id(), Utc::now())
        .await?;

    Ok(Json(ClearedArchive { deleted }))
}

#[utoipa::path(
    patch,
    path = "/v1/tasks/{id}/name",
    tag = "tasks",
    request_body = TaskNameSchema,
    params(
        ("id" = i32, Path, description = "Task id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Task),
        (status = 403, description = "The task belongs to someone else")
    )
)]
async fn update_name(
    session: Session,
    State(context): State<ServerContext>,
    Path(task_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<TaskNameSchema>,
) -> ServerResult<Json<Task>> {
    let task = context
        .collab
        .tasks
        .update_name(session.user_id(), task_id, &body.name, Utc::now())
        .await?;

    Ok(context.task(task))
}

#[utoipa::path(
    patch,
    path = "/v1/tasks/{id}/done",
    tag = "tasks",
    request_body = TaskDoneSchema,
    params(
        ("id" = i32, Path, description = "Task id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Task),
        (status = 403, description = "The task belongs to someone else")
    )
)]
async fn toggle_done(
    session: Session,
    State(context): State<ServerContext>,
    Path(task_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<TaskDoneSchema>,
) -> ServerResult<Json<Task>> {
    let task = context
        .collab
        .tasks
        .toggle_done(session.user_id(), task_id, body.is_done, Utc::now())
        .await?;

    Ok(context.task(task))
}

#[utoipa::path(
    patch,
    path = "/v1/tasks/{id}/due-date",
    tag = "tasks",
    request_body = TaskDueDateSchema,
    params(
        ("id" = i32, Path, description = "Task id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Task),
        (status = 403, description = "The task belongs to someone else")
    )
)]
async fn update_due_date(
    session: Session,
    State(context): State<ServerContext>,
    Path(task_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<TaskDueDateSchema>,
) -> ServerResult<Json<Task>> {
    let task = context
        .collab
        .tasks
        .update_due_date(session.user_id(), task_id, body.due_date, Utc::now())
        .await?;

    Ok(context.task(task))
}

#[utoipa::path(
    patch,
    path = "/v1/tasks/{id}/privacy",
    tag = "tasks",
    request_body = TaskPrivacySchema,
    params(
        ("id" = i32, Path, description = "Task id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Task),
        (status = 403, description = "The task belongs to someone else")
    )
)]
async fn update_privacy(
    session: Session,
    State(context): State<ServerContext>,
    Path(task_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<TaskPrivacySchema>,
) -> ServerResult<Json<Task>> {
    let task = context
        .collab
        .tasks
        .update_privacy(session.user_id(), task_id, body.is_private, Utc::now())
        .await?;

    Ok(context.task(task))
}

#[utoipa::path(
    delete,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i32, Path, description = "Task id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The task was deleted"),
        (status = 403, description = "The task belongs to someone else"),
        (status = 404, description = "No such task")
    )
)]
async fn delete_task(
    session: Session,
    State(context): State<ServerContext>,
    Path(task_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .tasks
        .delete_task(session.user_id(), task_id)
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_task))
        .route("/assign", post(assign_task))
        .route("/today", get(today))
        .route("/scheduled", get(scheduled))
        .route("/archived", get(archived).delete(clear_archived))
        .route("/archived/count", get(archived_count))
        .route("/:id", delete(delete_task))
        .route("/:id/name", patch(update_name))
        .route("/:id/done", patch(toggle_done))
        .route("/:id/due-date", patch(update_due_date))
        .route("/:id/privacy", patch(update_privacy))
}
