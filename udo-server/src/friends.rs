use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json,
};
use chrono::Utc;

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{FriendRequestSchema, PermissionSchema, ValidatedJson},
    serialized::{FriendPermission, FriendRequest, FriendRequests, PublicUser, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/friends",
    tag = "friends",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<PublicUser>, description = "Friends sorted by username")
    )
)]
async fn list_friends(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<PublicUser>>> {
    let friends = context
        .collab
        .friends
        .list_friends(session.user_id())
        .await?;

    Ok(Json(friends.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/friends/{id}",
    tag = "friends",
    params(
        ("id" = i32, Path, description = "User id of the friend")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The friendship, its pins and its permissions are gone")
    )
)]
async fn unfriend(
    session: Session,
    State(context): State<ServerContext>,
    Path(friend_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .friends
        .unfriend(session.user_id(), friend_id)
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/friends/requests",
    tag = "friends",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendRequests, description = "Pending requests to and from the user")
    )
)]
async fn list_requests(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<FriendRequests>> {
    let requests = context
        .collab
        .friends
        .list_requests(session.user_id())
        .await?;

    Ok(Json(requests.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/friends/requests",
    tag = "friends",
    request_body = FriendRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendRequest),
        (status = 404, description = "The recipient does not exist"),
        (status = 409, description = "Already friends, or a request is pending")
    )
)]
async fn send_request(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<FriendRequestSchema>,
) -> ServerResult<Json<FriendRequest>> {
    let request = context
        .collab
        .friends
        .send_request(session.user_id(), body.recipient_id, Utc::now())
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/friends/requests/{id}/accept",
    tag = "friends",
    params(
        ("id" = i32, Path, description = "Friend request id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendRequest),
        (status = 403, description = "Only the recipient can accept"),
        (status = 404, description = "No pending request with this id")
    )
)]
async fn accept_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(request_id): Path<i32>,
) -> ServerResult<Json<FriendRequest>> {
    let request = context
        .collab
        .friends
        .accept_request(request_id, session.user_id(), Utc::now())
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/friends/requests/{id}/decline",
    tag = "friends",
    params(
        ("id" = i32, Path, description = "Friend request id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendRequest),
        (status = 403, description = "Only the recipient can decline"),
        (status = 404, description = "No pending request with this id")
    )
)]
async fn decline_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(request_id): Path<i32>,
) -> ServerResult<Json<FriendRequest>> {
    let request = context
        .collab
        .friends
        .decline_request(request_id, session.user_id(), Utc::now())
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/friends/requests/{id}",
    tag = "friends",
    params(
        ("id" = i32, Path, description = "Friend request id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The request was withdrawn"),
        (status = 403, description = "Only the requester can withdraw")
    )
)]
async fn withdraw_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(request_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .friends
        .withdraw_request(request_id, session.user_id())
        .await?;

    Ok(())
}

#[utoipa::path(
    put,
    path = "/v1/friends/pins/{username}",
    tag = "friends",
    params(
        ("username" = String, Path, description = "Username of the friend to pin")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = PublicUser),
        (status = 403, description = "Only friends can be pinned")
    )
)]
async fn pin(
    session: Session,
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<Json<PublicUser>> {
    let friend = context
        .collab
        .friends
        .pin(session.user_id(), &username, Utc::now())
        .await?;

    Ok(Json(friend.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/friends/pins/{username}",
    tag = "friends",
    params(
        ("username" = String, Path, description = "Username of the friend to unpin")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The friend is no longer pinned")
    )
)]
async fn unpin(
    session: Session,
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<()> {
    context
        .collab
        .friends
        .unpin(session.user_id(), &username)
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/friends/permissions",
    tag = "friends",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<FriendPermission>, description = "Every permission the user has granted")
    )
)]
async fn list_permissions(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<FriendPermission>>> {
    let permissions = context
        .collab
        .friends
        .permissions(session.user_id())
        .await?;

    Ok(Json(permissions.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/friends/{id}/permission",
    tag = "friends",
    params(
        ("id" = i32, Path, description = "User id of the friend")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendPermission, description = "Whether the friend may create tasks for the user")
    )
)]
async fn permission(
    session: Session,
    State(context): State<ServerContext>,
    Path(friend_id): Path<i32>,
) -> ServerResult<Json<FriendPermission>> {
    let allowed = context
        .collab
        .friends
        .create_permission(session.user_id(), friend_id)
        .await?;

    Ok(Json(FriendPermission::from_flag(friend_id, allowed)))
}

#[utoipa::path(
    put,
    path = "/v1/friends/{id}/permission",
    tag = "friends",
    request_body = PermissionSchema,
    params(
        ("id" = i32, Path, description = "User id of the friend")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendPermission),
        (status = 403, description = "Permissions can only be given to friends")
    )
)]
async fn set_permission(
    session: Session,
    State(context): State<ServerContext>,
    Path(friend_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<PermissionSchema>,
) -> ServerResult<Json<FriendPermission>> {
    let permission = context
        .collab
        .friends
        .set_create_permission(
            session.user_id(),
            friend_id,
            body.can_create_tasks,
            Utc::now(),
        )
        .await?;

    Ok(Json(permission.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_friends))
        .route("/requests", get(list_requests).post(send_request))
        .route("/requests/:id", delete(withdraw_request))
        .route("/requests/:id/accept", post(accept_request))
        .route("/requests/:id/decline", post(decline_request))
        .route("/pins/:username", put(pin).delete(unpin))
        .route("/permissions", get(list_permissions))
        .route("/:id", delete(unfriend))
        .route("/:id/permission", get(permission).put(set_permission))
}
