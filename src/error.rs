use poem::error::ResponseError;
use poem::http::StatusCode;
use thiserror::Error;

use crate::storage::StorageError;

/// Everything a user or picture operation can fail with.
#[derive(Debug, Error)]
pub enum PicsError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("profile picture not found: {0}")]
    PictureNotFound(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl PicsError {
    /// True for every flavour of missing resource, including content which
    /// vanished from the storage backend.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_)
                | Self::PictureNotFound(_)
                | Self::Storage(StorageError::NotFound(_))
        )
    }
}

impl ResponseError for PicsError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Storage(StorageError::InvalidName(_)) => {
                StatusCode::BAD_REQUEST
            },
            _ if self.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type PicsResult<T> = std::result::Result<T, PicsError>;
