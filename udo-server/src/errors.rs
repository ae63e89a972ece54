use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;
use udo_collab::{AuthError, CollabError, DatabaseError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("{0}")]
    NotAuthorized(String),
    #[error("{0}")]
    Validation(String),
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Self::Unknown(message) = &self {
            error!("Request failed: {}", message);
        }

        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::NotAuthenticated => Self::NotAuthenticated,
            AuthError::InvalidCode | AuthError::CodeExpired => Self::NotAuthenticated,
            e @ AuthError::InvalidEmail => Self::Validation(e.to_string()),
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<CollabError> for ServerError {
    fn from(value: CollabError) -> Self {
        match value {
            CollabError::NotAuthorized(message) => Self::NotAuthorized(message),
            CollabError::Validation(message) => Self::Validation(message),
            CollabError::Db(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use axum::http::StatusCode;
    use udo_collab::{AuthError, CollabError, DatabaseError};

    use super::ServerError;

    fn status(error: impl Into<ServerError>) -> StatusCode {
        error.into().as_status_code()
    }

    #[test]
    fn collab_errors_map_to_statuses() {
        let not_found = DatabaseError::NotFound {
            resource: "task",
            identifier: "id",
        };
        let conflict = DatabaseError::Conflict {
            resource: "user",
            field: "username",
            value: "alice".to_string(),
        };
        let internal = DatabaseError::Internal(Box::new(io::Error::new(io::ErrorKind::Other, "down")));

        assert_eq!(status(CollabError::Db(not_found)), StatusCode::NOT_FOUND);
        assert_eq!(status(CollabError::Db(conflict)), StatusCode::CONFLICT);
        assert_eq!(status(CollabError::Db(internal)), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status(CollabError::NotAuthorized("nope".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(CollabError::Validation("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(status(AuthError::NotAuthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidCode), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::CodeExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidEmail), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AuthError::Delivery("smtp".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
