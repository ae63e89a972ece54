use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json,
};
use chrono::Utc;
use udo_collab::ProfileUpdate;

use crate::{
    auth::Session,
    errors::{ServerError, ServerResult},
    schemas::{AvailabilityQuery, ProfileSchema, SearchQuery, ValidatedJson},
    serialized::{Availability, PublicUser, ToSerialized, User},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/users/search",
    tag = "users",
    params(SearchQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<PublicUser>)
    )
)]
async fn search(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<Vec<PublicUser>>> {
    let users = context
        .collab
        .users
        .search_by_username_prefix(&query.q, session.user_id(), query.limit)
        .await?;

    Ok(Json(users.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/users/available",
    tag = "users",
    params(AvailabilityQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Availability),
        (status = 400, description = "The username is not valid")
    )
)]
async fn availability(
    _session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<AvailabilityQuery>,
) -> ServerResult<Json<Availability>> {
    let available = context
        .collab
        .users
        .is_username_available(&query.username)
        .await?;

    Ok(Json(Availability { available }))
}

#[utoipa::path(
    patch,
    path = "/v1/users/me",
    tag = "users",
    request_body = ProfileSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 409, description = "The username is taken")
    )
)]
async fn update_profile(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<ProfileSchema>,
) -> ServerResult<Json<User>> {
    let user = context
        .collab
        .users
        .update_profile(
            session.user_id(),
            ProfileUpdate {
                display_name: body.display_name,
                username: body.username,
            },
            Utc::now(),
        )
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/users/{username}",
    tag = "users",
    params(
        ("username" = String, Path, description = "Case-insensitive username")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = PublicUser),
        (status = 404, description = "No user has this username")
    )
)]
async fn user_by_username(
    _session: Session,
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<Json<PublicUser>> {
    let user = context
        .collab
        .users
        .resolve_by_username(&username)
        .await?
        .ok_or(ServerError::NotFound {
            resource: "user",
            identifier: "username",
        })?;

    Ok(Json(user.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/available", get(availability))
        .route("/me", patch(update_profile))
        .route("/:username", get(user_by_username))
}
