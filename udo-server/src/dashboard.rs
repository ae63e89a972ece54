use axum::{extract::State, routing::get, Json};
use chrono::Utc;

use crate::{
    auth::Session, errors::ServerResult, serialized::PinnedFriendTasks, Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/dashboard/pinned",
    tag = "dashboard",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (
            status = 200,
            body = Vec<PinnedFriendTasks>,
            description = "Today tasks of each pinned friend, in pin order, without private tasks"
        )
    )
)]
async fn pinned(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<PinnedFriendTasks>>> {
    let entries = context
        .collab
        .dashboard
        .pinned_friends_today_tasks(session.user_id(), Utc::now())
        .await?;

    let today = context.today();

    Ok(Json(
        entries
            .iter()
            .map(|e| PinnedFriendTasks::on(e, today))
            .collect(),
    ))
}

pub fn router() -> Router {
    Router::new().route("/pinned", get(pinned))
}
