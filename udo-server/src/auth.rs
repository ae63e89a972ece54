use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json,
};
use chrono::Utc;
use udo_collab::{SessionData, UserData};

use crate::{
    errors::ServerResult,
    schemas::{RequestCodeSchema, ValidatedJson, VerifyCodeSchema},
    serialized::{LoginResult, ToSerialized, User},
    Router, ServerContext,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> &UserData {
        &self.0.user
    }

    pub fn user_id(&self) -> i32 {
        self.0.user.id
    }
}

/// Reads the token out of an `Authorization: Bearer <token>` header
pub(crate) fn bearer_token(parts: &Parts) -> Result<&str, (StatusCode, &'static str)> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|x| x.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization"))?;

    let mut split = value.split_ascii_whitespace();

    if split.next() != Some("Bearer") {
        return Err((StatusCode::BAD_REQUEST, "Authorization must be Bearer"));
    }

    split
        .next()
        .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization"))
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);
        let token = bearer_token(parts)?;

        let session = context
            .collab
            .auth
            .session(token, Utc::now())
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Session does not exist"))?;

        Ok(Self(session))
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/code",
    tag = "auth",
    request_body = RequestCodeSchema,
    responses(
        (status = 200, description = "A verification code was sent to the email address"),
        (status = 400, description = "The email address is malformed")
    )
)]
async fn request_code(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<RequestCodeSchema>,
) -> ServerResult<()> {
    context
        .collab
        .auth
        .request_code(&body.email, Utc::now())
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    tag = "auth",
    request_body = VerifyCodeSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 401, description = "The code is wrong or has expired")
    )
)]
async fn verify_code(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<VerifyCodeSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .collab
        .auth
        .verify_code(&body.email, &body.code, Utc::now())
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The session was deleted")
    )
)]
async fn logout(session: Session, State(context): State<ServerContext>) -> ServerResult<()> {
    context.collab.auth.logout(&session.0.token).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/auth/user",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 401, description = "Missing or expired session")
    )
)]
async fn user(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

pub fn router() -> Router {
    Router::new()
        .route("/code", post(request_code))
        .route("/verify", post(verify_code))
        .route("/logout", post(logout))
        .route("/user", get(user))
}

#[cfg(test)]
mod test {
    use axum::http::{header, Request, StatusCode};

    use super::bearer_token;

    fn token_of(value: Option<&str>) -> Result<String, StatusCode> {
        let mut builder = Request::builder();

        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }

        let (parts, _) = builder.body(()).unwrap().into_parts();

        bearer_token(&parts)
            .map(|t| t.to_string())
            .map_err(|(status, _)| status)
    }

    #[test]
    fn reads_bearer_tokens() {
        assert_eq!(token_of(Some("Bearer abc123")), Ok("abc123".to_string()));
        assert_eq!(token_of(None), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(token_of(Some("Basic abc123")), Err(StatusCode::BAD_REQUEST));
        assert_eq!(token_of(Some("Bearer")), Err(StatusCode::UNAUTHORIZED));
    }
}
