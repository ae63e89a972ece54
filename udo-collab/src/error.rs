use thiserror::Error;

use crate::DatabaseError;

pub type CollabResult<T> = Result<T, CollabError>;

/// Errors returned by the U-Do services
#[derive(Debug, Error)]
pub enum CollabError {
    /// The caller is not the owner of the resource, or not the right party to it
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    /// The input was rejected before touching storage
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Not found, conflicts, and internal failures from the database
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl CollabError {
    pub(crate) fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
