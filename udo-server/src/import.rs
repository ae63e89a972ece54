use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    routing::post,
    Json,
};
use chrono::Utc;
use log::warn;
use udo_collab::{
    ImportedFriendRequest, ImportedPair, ImportedPermission, ImportedTask, ImportedUser,
};

use crate::{
    auth::bearer_token,
    errors::ServerResult,
    serialized::{ImportResult, ToSerialized},
    Router, ServerContext,
};

/// Proof that the request carries the migration secret
pub struct ImportSecret;

#[async_trait]
impl<S> FromRequestParts<S> for ImportSecret
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let Some(secret) = context.migration_secret else {
            warn!("Refusing import, no migration secret is configured");
            return Err((StatusCode::UNAUTHORIZED, "Imports are disabled"));
        };

        let token = bearer_token(parts)?;

        if !secrets_match(token.as_bytes(), secret.as_bytes()) {
            return Err((StatusCode::UNAUTHORIZED, "Invalid migration secret"));
        }

        Ok(Self)
    }
}

/// Compares every byte regardless of where the first difference is
fn secrets_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }

    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[utoipa::path(
    post,
    path = "/v1/import/users",
    tag = "import",
    security(
        ("MigrationSecret" = [])
    ),
    responses(
        (status = 200, body = ImportResult, description = "Users were upserted by email"),
        (status = 401, description = "Missing or wrong migration secret")
    )
)]
async fn import_users(
    _secret: ImportSecret,
    State(context): State<ServerContext>,
    Json(records): Json<Vec<ImportedUser>>,
) -> ServerResult<Json<ImportResult>> {
    let report = context
        .collab
        .importer
        .import_users(records, Utc::now())
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/import/tasks",
    tag = "import",
    security(
        ("MigrationSecret" = [])
    ),
    responses(
        (status = 200, body = ImportResult, description = "Tasks were upserted by owner, name and creation time"),
        (status = 401, description = "Missing or wrong migration secret")
    )
)]
async fn import_tasks(
    _secret: ImportSecret,
    State(context): State<ServerContext>,
    Json(records): Json<Vec<ImportedTask>>,
) -> ServerResult<Json<ImportResult>> {
    let report = context
        .collab
        .importer
        .import_tasks(records, Utc::now())
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/import/friend-requests",
    tag = "import",
    security(
        ("MigrationSecret" = [])
    ),
    responses(
        (status = 200, body = ImportResult, description = "Friend requests were upserted by requester and recipient"),
        (status = 401, description = "Missing or wrong migration secret")
    )
)]
async fn import_friend_requests(
    _secret: ImportSecret,
    State(context): State<ServerContext>,
    Json(records): Json<Vec<ImportedFriendRequest>>,
) -> ServerResult<Json<ImportResult>> {
    let report = context
        .collab
        .importer
        .import_friend_requests(records, Utc::now())
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/import/friendships",
    tag = "import",
    security(
        ("MigrationSecret" = [])
    ),
    responses(
        (status = 200, body = ImportResult, description = "Friendships were created in both directions"),
        (status = 401, description = "Missing or wrong migration secret")
    )
)]
async fn import_friendships(
    _secret: ImportSecret,
    State(context): State<ServerContext>,
    Json(records): Json<Vec<ImportedPair>>,
) -> ServerResult<Json<ImportResult>> {
    let report = context
        .collab
        .importer
        .import_friendships(records, Utc::now())
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/import/pinned",
    tag = "import",
    security(
        ("MigrationSecret" = [])
    ),
    responses(
        (status = 200, body = ImportResult, description = "Pins were created"),
        (status = 401, description = "Missing or wrong migration secret")
    )
)]
async fn import_pinned(
    _secret: ImportSecret,
    State(context): State<ServerContext>,
    Json(records): Json<Vec<ImportedPair>>,
) -> ServerResult<Json<ImportResult>> {
    let report = context
        .collab
        .importer
        .import_pinned(records, Utc::now())
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/import/perms",
    tag = "import",
    security(
        ("MigrationSecret" = [])
    ),
    responses(
        (status = 200, body = ImportResult, description = "Permissions were set"),
        (status = 401, description = "Missing or wrong migration secret")
    )
)]
async fn import_perms(
    _secret: ImportSecret,
    State(context): State<ServerContext>,
    Json(records): Json<Vec<ImportedPermission>>,
) -> ServerResult<Json<ImportResult>> {
    let report = context
        .collab
        .importer
        .import_perms(records, Utc::now())
        .await?;

    Ok(Json(report.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/users", post(import_users))
        .route("/tasks", post(import_tasks))
        .route("/friend-requests", post(import_friend_requests))
        .route("/friendships", post(import_friendships))
        .route("/pinned", post(import_pinned))
        .route("/perms", post(import_perms))
}
